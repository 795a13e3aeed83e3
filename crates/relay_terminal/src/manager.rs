//! §4.10 `createSession` / viewer relay / teardown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{ DateTime, Utc };
use dashmap::DashMap;
use relay_registry::AgentRegistry;
use relay_repository::Repository;
use relay_router::{ send_command, CommandContext };
use relay_types::{ BrokerError, TerminalSessionId };
use serde_json::{ json, Value };
use tokio::sync::mpsc;

use crate::token::TokenStore;

const POLL_INTERVAL: Duration = Duration::from_millis( 100 );

struct TerminalSession
{
  agent_db_id: String,
  agent_session_id: String,
  #[ allow( dead_code ) ]
  user_id: String,
  #[ allow( dead_code ) ]
  created_at: DateTime< Utc >,
  poll_handle: tokio::task::AbortHandle,
}

/// Live terminal sessions keyed by their ephemeral id, plus the one-shot
/// viewer handoff tokens that bootstrap them.
pub struct TerminalManager
{
  registry: Arc< AgentRegistry >,
  repository: Repository,
  tokens: TokenStore,
  sessions: DashMap< TerminalSessionId, TerminalSession >,
}

impl TerminalManager
{
  #[ must_use ]
  pub fn new( registry: Arc< AgentRegistry >, repository: Repository ) -> Self
  {
    Self { registry, repository, tokens: TokenStore::new(), sessions: DashMap::new() }
  }

  #[ must_use ]
  pub fn tokens( &self ) -> &TokenStore
  {
    &self.tokens
  }

  /// §4.10 `createSession(viewerSocket, token, viewerAddr)`. `output` receives
  /// each `terminal_output` poll's bytes; the poll loop calls `terminal_stop`
  /// and tears itself down the moment a send to `output` fails (the viewer
  /// side closed).
  ///
  /// # Errors
  /// [`BrokerError::Auth`] if `token` is unknown/expired/already consumed,
  /// [`BrokerError::NotFound`] if the named agent has no live socket.
  pub async fn create_session( &self, token: &str, output: mpsc::Sender< Vec< u8 > > ) -> Result< TerminalSessionId, BrokerError >
  {
    let claim = self.tokens.consume( token ).ok_or_else( || BrokerError::Auth( "invalid or expired terminal token".into() ) )?;

    let agent = self.registry.get_agent( &claim.agent_db_id )
      .ok_or_else( || BrokerError::NotFound( "agent not connected".into() ) )?;

    let ctx = CommandContext::default();
    let started = send_command( &self.repository, &agent, "terminal_start", json!( {} ), &ctx ).await?;
    let agent_session_id = started.get( "sessionId" ).and_then( Value::as_str )
      .ok_or_else( || BrokerError::Internal( "agent did not return a terminal sessionId".into() ) )?
      .to_string();

    let session_id = TerminalSessionId::generate();
    let poll_handle = self.spawn_poll_loop( session_id, agent, agent_session_id.clone(), output );

    self.sessions.insert( session_id, TerminalSession
    {
      agent_db_id: claim.agent_db_id,
      agent_session_id,
      user_id: claim.user_id,
      created_at: Utc::now(),
      poll_handle,
    } );

    Ok( session_id )
  }

  fn spawn_poll_loop(
    &self,
    session_id: TerminalSessionId,
    agent: Arc< relay_registry::ConnectedAgent >,
    agent_session_id: String,
    output: mpsc::Sender< Vec< u8 > >,
  ) -> tokio::task::AbortHandle
  {
    let repository = self.repository.clone();
    let handle = tokio::spawn( async move
    {
      let _span = tracing::debug_span!( "terminal_poll", session = %session_id ).entered();
      loop
      {
        tokio::time::sleep( POLL_INTERVAL ).await;

        let ctx = CommandContext::default();
        let params = json!( { "sessionId": agent_session_id } );
        let result = match send_command( &repository, &agent, "terminal_output", params, &ctx ).await
        {
          Ok( value ) => value,
          Err( _ ) => break,
        };

        let bytes = result.get( "data" ).and_then( Value::as_str )
          .map( |text| text.as_bytes().to_vec() )
          .unwrap_or_default();

        if !bytes.is_empty() && output.send( bytes ).await.is_err()
        {
          let stop_params = json!( { "sessionId": agent_session_id } );
          let _ = send_command( &repository, &agent, "terminal_stop", stop_params, &CommandContext::default() ).await;
          break;
        }
      }
    } );

    handle.abort_handle()
  }

  /// §4.10 `handleViewerInput` — forwards as `terminal_input`.
  ///
  /// # Errors
  /// [`BrokerError::NotFound`] if `session_id` is unknown.
  pub async fn handle_viewer_input( &self, session_id: &TerminalSessionId, data: &[ u8 ] ) -> Result< (), BrokerError >
  {
    self.forward( session_id, "terminal_input", json!( { "data": String::from_utf8_lossy( data ) } ) ).await
  }

  /// §4.10 `handleResize` — forwards as `terminal_resize`.
  ///
  /// # Errors
  /// [`BrokerError::NotFound`] if `session_id` is unknown.
  pub async fn handle_resize( &self, session_id: &TerminalSessionId, cols: u32, rows: u32 ) -> Result< (), BrokerError >
  {
    self.forward( session_id, "terminal_resize", json!( { "cols": cols, "rows": rows } ) ).await
  }

  async fn forward( &self, session_id: &TerminalSessionId, method: &str, params: Value ) -> Result< (), BrokerError >
  {
    let agent_db_id;
    let agent_session_id;
    {
      let session = self.sessions.get( session_id ).ok_or_else( || BrokerError::NotFound( "terminal session not found".into() ) )?;
      agent_db_id = session.agent_db_id.clone();
      agent_session_id = session.agent_session_id.clone();
    }
    let agent = self.registry.get_agent( &agent_db_id ).ok_or_else( || BrokerError::NotFound( "agent disconnected".into() ) )?;

    let mut full_params = json!( { "sessionId": agent_session_id } );
    if let ( Value::Object( ref mut full ), Value::Object( extra ) ) = ( &mut full_params, params )
    {
      full.extend( extra );
    }

    send_command( &self.repository, &agent, method, full_params, &CommandContext::default() ).await?;
    Ok( () )
  }

  /// §4.10 teardown: sends `terminal_stop`, aborts the poll loop, and drops
  /// the session from the registry.
  pub async fn stop_session( &self, session_id: &TerminalSessionId )
  {
    let Some( ( _, session ) ) = self.sessions.remove( session_id ) else { return };
    session.poll_handle.abort();

    if let Some( agent ) = self.registry.get_agent( &session.agent_db_id )
    {
      let params = json!( { "sessionId": session.agent_session_id } );
      let _ = send_command( &self.repository, &agent, "terminal_stop", params, &CommandContext::default() ).await;
    }
  }
}
