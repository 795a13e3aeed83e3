//! axum WebSocket upgrade and the reader/writer task split (§4.5, §9 design
//! note: each agent is two logical tasks joined by a bounded channel).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{ CloseFrame, Message, WebSocket, WebSocketUpgrade };
use axum::extract::{ ConnectInfo, State };
use axum::response::IntoResponse;
use futures_util::{ SinkExt, StreamExt };
use relay_registry::{ AgentRegistry, ConnectedAgent, SocketCommand, StateUpdate };
use relay_repository::Repository;
use relay_update::VersionCache;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::wire::{ AgentFrame, BrokerFrame, PowerConfig };

/// Outbound frames are buffered at most this deep before backpressuring the
/// writer task (§5 "bounded channel").
const OUTBOUND_CHANNEL_CAPACITY: usize = 64;

/// No channel negotiation exists in the register frame yet, so every agent
/// is checked against the stable channel (§4.9).
const DEFAULT_UPDATE_CHANNEL: &str = "STABLE";

#[ derive( Clone ) ]
pub struct SocketState
{
  pub registry: Arc< AgentRegistry >,
  pub repository: Repository,
  pub version_cache: Arc< VersionCache >,
}

pub async fn agent_ws_handler(
  ws: WebSocketUpgrade,
  ConnectInfo( remote_addr ): ConnectInfo< SocketAddr >,
  State( state ): State< SocketState >,
) -> impl IntoResponse
{
  ws.on_upgrade( move |socket| handle_socket( socket, remote_addr.to_string(), state ) )
}

async fn handle_socket( socket: WebSocket, remote_address: String, state: SocketState )
{
  let ( mut sink, mut stream ) = socket.split();
  let ( outbound_tx, mut outbound_rx ) = mpsc::channel::< SocketCommand >( OUTBOUND_CHANNEL_CAPACITY );

  let writer = tokio::spawn( async move
  {
    while let Some( command ) = outbound_rx.recv().await
    {
      match command
      {
        SocketCommand::Send( value ) =>
        {
          let Ok( text ) = serde_json::to_string( &value ) else { continue };
          if sink.send( Message::Text( text ) ).await.is_err()
          {
            break;
          }
        }
        SocketCommand::Close { code, reason } =>
        {
          let _ = sink.send( Message::Close( Some( CloseFrame { code, reason: reason.into() } ) ) ).await;
          break;
        }
      }
    }
  } );

  let Some( agent ) = register_agent( &mut stream, &outbound_tx, remote_address, &state ).await else
  {
    writer.abort();
    return;
  };

  while let Some( Ok( message ) ) = stream.next().await
  {
    match message
    {
      Message::Text( text ) =>
      {
        if let Err( err ) = handle_frame( &text, &agent, &state ).await
        {
          tracing::warn!( connection_id = %agent.connection_id, error = %err, "agent frame handling failed" );
        }
      }
      Message::Close( _ ) => break,
      _ => {}
    }
  }

  let _ = state.registry.unregister( agent.connection_id ).await;
  writer.abort();
}

async fn register_agent(
  stream: &mut ( impl futures_util::Stream< Item = Result< Message, axum::Error > > + Unpin ),
  outbound_tx: &mpsc::Sender< SocketCommand >,
  remote_address: String,
  state: &SocketState,
) -> Option< Arc< ConnectedAgent > >
{
  let message = stream.next().await?.ok()?;
  let Message::Text( text ) = message else { return None };
  let frame: AgentFrame = serde_json::from_str( &text ).ok()?;
  let AgentFrame::Register( register_request ) = frame else { return None };

  match state.registry.register( outbound_tx.clone(), remote_address, register_request ).await
  {
    Ok( agent ) =>
    {
      let payload = AgentRegistry::registered_payload( &agent );
      if let Ok( json ) = serde_json::to_value( BrokerFrame::Registered( payload ) )
      {
        let _ = outbound_tx.send( SocketCommand::Send( json ) ).await;
      }
      send_update_check( &agent, state ).await;
      Some( agent )
    }
    Err( err ) =>
    {
      let _ = outbound_tx.send( SocketCommand::Close { code: 4000, reason: err.to_string() } ).await;
      None
    }
  }
}

/// §4.9: tells a freshly-registered agent whether a newer build is available
/// for its platform. Best-effort — a cache miss or repository error just
/// means no update frame is sent this connection.
async fn send_update_check( agent: &ConnectedAgent, state: &SocketState )
{
  let Some( agent_version ) = agent.agent_version.as_deref() else { return };
  let platform_arch = format!( "{}-{}", format!( "{:?}", agent.os_type ).to_lowercase(), agent.arch.as_deref().unwrap_or( "unknown" ) );

  let result = relay_update::check_update_available(
    &state.version_cache,
    &state.repository,
    agent_version,
    &platform_arch,
    agent.machine_id.as_deref(),
    DEFAULT_UPDATE_CHANNEL,
  ).await;

  let Ok( check ) = result else { return };
  if !check.has_update
  {
    return;
  }

  let frame = BrokerFrame::Update { has_update: check.has_update, version: check.version, is_forced: check.is_forced };
  if let Ok( json ) = serde_json::to_value( frame )
  {
    let _ = agent.outbound.send( SocketCommand::Send( json ) ).await;
  }
}

async fn handle_frame( text: &str, agent: &Arc< ConnectedAgent >, state: &SocketState ) -> Result< (), relay_types::BrokerError >
{
  let frame: AgentFrame = serde_json::from_str( text )
    .map_err( |e| relay_types::BrokerError::Protocol( e.to_string() ) )?;

  match frame
  {
    AgentFrame::Register( _ ) => {}
    AgentFrame::Response { id, result } =>
    {
      state.registry.handle_response( agent, &id, Ok( result ) ).await?;
    }
    AgentFrame::Error { id, error } =>
    {
      let message = error.get( "message" ).and_then( Value::as_str ).map_or_else( || error.to_string(), str::to_string );
      state.registry.handle_response( agent, &id, Err( message ) ).await?;
    }
    AgentFrame::Pong { .. } =>
    {
      state.registry.update_ping( agent );
    }
    AgentFrame::Heartbeat( update ) =>
    {
      send_heartbeat_ack( agent, state, update, None ).await?;
    }
    AgentFrame::StateChange( update ) =>
    {
      let new_interval = update.power_state.map( relay_types::PowerState::heartbeat_interval_secs );
      let woke = state.registry.update_state( agent, update.clone() ).await?;

      let frame = BrokerFrame::Config
      {
        id: None,
        config: PowerConfig
        {
          heartbeat_interval: new_interval.unwrap_or_else( || agent.power_state.lock().unwrap().heartbeat_interval_secs() ),
          power_state: update.power_state,
        },
      };
      send_frame( agent, frame ).await;

      if woke
      {
        relay_router::redispatch_queue( &state.repository, &state.registry, agent ).await;
      }
    }
  }

  Ok( () )
}

async fn send_heartbeat_ack(
  agent: &Arc< ConnectedAgent >,
  state: &SocketState,
  update: StateUpdate,
  request_id: Option< String >,
) -> Result< (), relay_types::BrokerError >
{
  let woke = state.registry.update_state( agent, update ).await?;
  let ( license_status, license_changed ) = state.registry.check_license_status( agent ).await?;

  let config = license_changed.then( || relay_registry::HeartbeatConfig
  {
    heartbeat_interval: agent.power_state.lock().unwrap().heartbeat_interval_secs(),
    grace_hours: 72,
  } );

  let pending_commands = state.registry.has_pending_queued_commands( &agent.connection_id );

  let frame = BrokerFrame::HeartbeatAck
  {
    id: request_id,
    license_status,
    license_changed,
    license_message: license_changed.then( || format!( "License status is now {license_status:?}" ) ),
    pending_commands,
    config,
  };
  send_frame( agent, frame ).await;

  if woke
  {
    relay_router::redispatch_queue( &state.repository, &state.registry, agent ).await;
  }

  Ok( () )
}

async fn send_frame( agent: &Arc< ConnectedAgent >, frame: BrokerFrame )
{
  if let Ok( json ) = serde_json::to_value( frame )
  {
    let _ = agent.outbound.send( SocketCommand::Send( json ) ).await;
  }
}
