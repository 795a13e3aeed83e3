//! `sendCommand` contract (§4.4): correlation id, 30s timeout, `CommandLog`
//! lifecycle, and the asleep-agent queueing path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{ Timelike, Utc };
use relay_registry::{ detect_quiet_hours, AgentRegistry, ConnectedAgent, PendingRequest, QueuedCommand, SocketCommand };
use relay_repository::Repository;
use relay_types::{ AgentConnectionStatus, BrokerError, PowerState };
use serde_json::{ json, Value };
use tokio::sync::oneshot;

const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Per-call context threaded through to the `CommandLog` row (§3.1 CommandLog).
#[ derive( Debug, Clone, Default ) ]
pub struct CommandContext
{
  pub ai_connection_id: Option< String >,
  pub ip_address: Option< String >,
}

/// §4.4 `sendCommand(agentId, method, params, ctx)`.
///
/// # Errors
/// `Precondition("Agent not connected")` if the socket is closed and the
/// agent isn't asleep, `Timeout` if the agent never responds within 30s, or
/// whatever error the agent itself reports.
pub async fn send_command(
  repository: &Repository,
  agent: &Arc< ConnectedAgent >,
  method: &str,
  params: Value,
  ctx: &CommandContext,
) -> Result< Value, BrokerError >
{
  let connection_status = *agent.connection_status.lock().unwrap();

  if connection_status == AgentConnectionStatus::Offline
  {
    let power_state = *agent.power_state.lock().unwrap();
    return if power_state == PowerState::Sleep
    {
      enqueue( agent, method, params ).await
    }
    else
    {
      Err( BrokerError::Precondition( "Agent not connected".into() ) )
    };
  }

  dispatch( repository, agent, method, params, ctx ).await
}

/// Queue a command for an asleep agent; the returned future resolves once
/// [`redispatch_queue`] processes it after the agent wakes.
async fn enqueue( agent: &Arc< ConnectedAgent >, method: &str, params: Value ) -> Result< Value, BrokerError >
{
  let ( resolver, receiver ) = oneshot::channel();
  agent.queued_commands.lock().unwrap().push( QueuedCommand
  {
    method: method.to_string(),
    params,
    enqueued_at: Utc::now(),
    resolver,
  } );

  match receiver.await
  {
    Ok( Ok( value ) ) => Ok( value ),
    Ok( Err( reason ) ) => Err( reason_to_error( &reason ) ),
    Err( _ ) => Err( BrokerError::Internal( "queued command dropped".into() ) ),
  }
}

/// Drain and dispatch every command queued while `agent` was asleep (§4.3
/// `processQueuedCommands`, triggered on a SLEEP→{ACTIVE,PASSIVE} transition).
pub async fn redispatch_queue( repository: &Repository, registry: &AgentRegistry, agent: &Arc< ConnectedAgent > )
{
  let queued = registry.process_queued_commands( &agent.connection_id );
  for command in queued
  {
    let outcome = dispatch( repository, agent, &command.method, command.params, &CommandContext::default() ).await;
    let _ = command.resolver.send( outcome.map_err( |e| e.to_string() ) );
  }
}

async fn dispatch(
  repository: &Repository,
  agent: &Arc< ConnectedAgent >,
  method: &str,
  params: Value,
  ctx: &CommandContext,
) -> Result< Value, BrokerError >
{
  let request_id = uuid::Uuid::new_v4().to_string();
  let tool_name = extract_tool_name( method, &params );

  record_activity( repository, &agent.owner_user_id ).await;

  let command_log_id = repository.insert_command_sent(
    &agent.db_id,
    ctx.ai_connection_id.as_deref(),
    method,
    tool_name.as_deref(),
    &params.to_string(),
    ctx.ip_address.as_deref(),
  ).await.map_err( |e| BrokerError::Internal( e.to_string() ) )?;

  let ( resolver, receiver ) = oneshot::channel();

  let timeout_agent = agent.clone();
  let timeout_repository = repository.clone();
  let timeout_request_id = request_id.clone();
  let timeout_command_log_id = command_log_id.clone();
  let timeout_task = tokio::spawn( async move
  {
    tokio::time::sleep( Duration::from_millis( REQUEST_TIMEOUT_MS ) ).await;
    if let Some( pending ) = timeout_agent.pending_requests.lock().unwrap().remove( &timeout_request_id )
    {
      let _ = timeout_repository
        .complete_command( &timeout_command_log_id, "TIMEOUT", None, Some( "Request timeout" ) )
        .await;
      let _ = pending.resolver.send( Err( "Request timeout".into() ) );
    }
  } );

  agent.pending_requests.lock().unwrap().insert( request_id.clone(), PendingRequest
  {
    resolver,
    command_log_id,
    started_at: Utc::now(),
    timeout_handle: timeout_task.abort_handle(),
  } );

  let frame = json!( { "type": "request", "id": request_id, "method": method, "params": params } );
  agent.outbound.send( SocketCommand::Send( frame ) ).await
    .map_err( |_| BrokerError::Internal( "agent socket closed".into() ) )?;

  match receiver.await
  {
    Ok( Ok( value ) ) => Ok( value ),
    Ok( Err( reason ) ) => Err( reason_to_error( &reason ) ),
    Err( _ ) => Err( BrokerError::Internal( "pending request dropped".into() ) ),
  }
}

/// Bump the caller's hourly-activity histogram and, once it crosses the
/// §4.3.3 100-sample threshold, detect and persist quiet hours. Advisory
/// only: failures here never fail the command itself.
async fn record_activity( repository: &Repository, user_id: &str )
{
  let hour = Utc::now().hour();
  let pattern = match repository.record_activity_hour( user_id, hour ).await
  {
    Ok( pattern ) => pattern,
    Err( error ) =>
    {
      tracing::warn!( user_id = %user_id, error = %error, "failed to record activity hour" );
      return;
    }
  };

  if pattern.quiet_hours_start.is_some() || pattern.quiet_hours_end.is_some()
  {
    return;
  }

  let total: i64 = pattern.hourly_activity.iter().sum();
  if total < 100
  {
    return;
  }

  if let Some( ( start, end ) ) = detect_quiet_hours( &pattern.hourly_activity )
  {
    if let Err( error ) = repository.set_quiet_hours( user_id, i64::from( start ), i64::from( end ) ).await
    {
      tracing::warn!( user_id = %user_id, error = %error, "failed to persist quiet hours" );
    }
  }
}

fn reason_to_error( reason: &str ) -> BrokerError
{
  if reason == "Request timeout"
  {
    BrokerError::Timeout( reason.to_string() )
  }
  else
  {
    BrokerError::Precondition( reason.to_string() )
  }
}

fn extract_tool_name( method: &str, params: &Value ) -> Option< String >
{
  if method == "tools/call"
  {
    params.get( "name" ).and_then( Value::as_str ).map( str::to_string )
  }
  else
  {
    None
  }
}
