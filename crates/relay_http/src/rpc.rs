//! §4.7.1 JSON-RPC method dispatch for the tenant endpoint.

use std::sync::Arc;

use chrono::{ DateTime, Utc };
use relay_registry::{ AgentRegistry, ConnectedAgent };
use relay_repository::Repository;
use relay_router::{ aggregate_tools, check_precondition, select_agent, send_command, CommandContext, SelectionOutcome };
use relay_types::{ required_scope_for_method, BrokerError, Scope };
use serde_json::{ json, Value };

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "relay-broker";
const SERVER_VERSION: &str = env!( "CARGO_PKG_VERSION" );

/// The caller identity and scope set threaded through every method handler.
pub struct RpcContext< 'a >
{
  pub repository: &'a Repository,
  pub registry: &'a AgentRegistry,
  pub user_id: &'a str,
  pub scopes: &'a [ Scope ],
  pub ip_address: Option< String >,
}

/// # Errors
/// Whatever [`BrokerError`] the method handler reports; the caller wraps it
/// into the JSON-RPC envelope or swallows it for notifications (§4.7 step 6).
pub async fn dispatch( ctx: &RpcContext< '_ >, method: &str, params: Value ) -> Result< Value, BrokerError >
{
  if let Some( required ) = required_scope_for_method( method )
  {
    if !ctx.scopes.contains( &required )
    {
      return Err( BrokerError::Scope( format!( "method {method} requires scope {}", required.as_str() ) ) );
    }
  }

  match method
  {
    "initialize" => Ok( initialize() ),
    "tools/list" => tools_list( ctx ).await,
    "tools/call" => tools_call( ctx, &params ).await,
    "resources/list" => Ok( json!( { "resources": [] } ) ),
    "prompts/list" => Ok( json!( { "prompts": [] } ) ),
    "ping" => Ok( json!( {} ) ),
    _ if method.starts_with( "notifications/" ) => Ok( json!( {} ) ),
    _ => Err( BrokerError::MethodNotFound( method.to_string() ) ),
  }
}

fn initialize() -> Value
{
  json!( {
    "protocolVersion": PROTOCOL_VERSION,
    "capabilities": { "tools": {}, "resources": {}, "prompts": {} },
    "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
  } )
}

async fn tools_list( ctx: &RpcContext< '_ > ) -> Result< Value, BrokerError >
{
  let tools = aggregate_tools( ctx.repository, ctx.registry, ctx.user_id ).await?;
  Ok( json!( { "tools": tools } ) )
}

/// Agents owned by `user_id` that currently hold a live socket, as the
/// `(dbId, resolvedName)` pairs §4.4 fuzzy selection scores against.
async fn online_candidates( ctx: &RpcContext< '_ > ) -> Result< Vec< ( String, String ) >, BrokerError >
{
  let rows = ctx.repository.list_agents_for_user( ctx.user_id ).await
    .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

  Ok(
    rows.iter()
      .filter( |r| r.status == "ONLINE" )
      .filter_map( |r| ctx.registry.get_agent( &r.id ).map( |agent| ( r.id.clone(), agent.resolved_name() ) ) )
      .collect()
  )
}

fn resolve_agent_selection( outcome: SelectionOutcome ) -> Result< ( String, String ), BrokerError >
{
  match outcome
  {
    SelectionOutcome::AutoSelected { db_id, name } => Ok( ( db_id, name ) ),
    SelectionOutcome::Confirm { name, score, .. } =>
      Err( BrokerError::Precondition( format!( "ambiguous agent match \"{name}\" (score {score:.2}), confirm explicitly" ) ) ),
    SelectionOutcome::Candidates( candidates ) =>
    {
      let names: Vec< &str > = candidates.iter().map( |c| c.name.as_str() ).collect();
      Err( BrokerError::Precondition( format!( "multiple agents online, specify agentId: {}", names.join( ", " ) ) ) )
    }
    SelectionOutcome::NoAgentsOnline => Err( BrokerError::Precondition( "no agents online".into() ) ),
  }
}

async fn selected_agent( ctx: &RpcContext< '_ >, requested: Option< &str > ) -> Result< Arc< ConnectedAgent >, BrokerError >
{
  let candidates = online_candidates( ctx ).await?;
  let ( db_id, _name ) = resolve_agent_selection( select_agent( requested, &candidates ) )?;
  ctx.registry.get_agent( &db_id ).ok_or_else( || BrokerError::NotFound( "agent disconnected during selection".into() ) )
}

async fn tools_call( ctx: &RpcContext< '_ >, params: &Value ) -> Result< Value, BrokerError >
{
  let name = params.get( "name" ).and_then( Value::as_str )
    .ok_or_else( || BrokerError::Protocol( "tools/call requires a name".into() ) )?;
  let arguments = params.get( "arguments" ).cloned().unwrap_or_else( || json!( {} ) );
  let requested_agent = arguments.get( "agentId" ).and_then( Value::as_str );

  match name
  {
    "emergency_stop" => emergency_stop( ctx, requested_agent ).await,
    "list_agents" => list_agents( ctx ).await,
    _ => forward_tool_call( ctx, name, requested_agent, arguments ).await,
  }
}

async fn forward_tool_call(
  ctx: &RpcContext< '_ >,
  name: &str,
  requested_agent: Option< &str >,
  arguments: Value,
) -> Result< Value, BrokerError >
{
  let agent = selected_agent( ctx, requested_agent ).await?;

  let state = *agent.state.lock().unwrap();
  let license_status = *agent.license_status.lock().unwrap();
  let is_screen_locked = *agent.is_screen_locked.lock().unwrap();
  check_precondition( state, license_status, is_screen_locked, name )?;

  let call_ctx = CommandContext { ai_connection_id: None, ip_address: ctx.ip_address.clone() };
  let result = send_command( ctx.repository, &agent, "tools/call", json!( { "name": name, "arguments": arguments } ), &call_ctx ).await?;
  Ok( normalize_tool_result( result ) )
}

/// §4.7.1 response normalization for `tools/call`.
fn normalize_tool_result( result: Value ) -> Value
{
  if let Value::Object( ref map ) = result
  {
    if let Some( error ) = map.get( "error" )
    {
      let text = error.as_str().map( str::to_string ).unwrap_or_else( || error.to_string() );
      return json!( { "content": [ { "type": "text", "text": text } ], "isError": true } );
    }

    let image = map.get( "imageData" ).or_else( || map.get( "data" ) ).or_else( || map.get( "base64" ) );
    if let Some( data ) = image
    {
      let mime_type = map.get( "mimeType" ).and_then( Value::as_str ).unwrap_or( "image/png" );
      return json!( { "content": [ { "type": "image", "data": data, "mimeType": mime_type } ] } );
    }
  }

  if let Value::String( text ) = &result
  {
    return json!( { "content": [ { "type": "text", "text": text } ] } );
  }

  json!( { "content": [ { "type": "text", "text": result.to_string() } ] } )
}

/// §4.7.1 `emergency_stop` — cancels every pending request on the selected
/// agent without re-dispatching its queue.
async fn emergency_stop( ctx: &RpcContext< '_ >, requested_agent: Option< &str > ) -> Result< Value, BrokerError >
{
  let agent = selected_agent( ctx, requested_agent ).await?;

  let pending: Vec< _ > = agent.pending_requests.lock().unwrap().drain().collect();
  let mut cancelled = 0usize;
  for ( _request_id, pending_request ) in pending
  {
    pending_request.timeout_handle.abort();
    let _ = ctx.repository.complete_command( &pending_request.command_log_id, "FAILED", None, Some( "Emergency stop" ) ).await;
    let _ = pending_request.resolver.send( Err( "Emergency stop".into() ) );
    cancelled += 1;
  }

  Ok( json!( { "content": [ { "type": "text", "text": format!( "Stopped {cancelled} pending command(s)" ) } ] } ) )
}

/// §4.7.1 `list_agents` — never leaks internal ids.
async fn list_agents( ctx: &RpcContext< '_ > ) -> Result< Value, BrokerError >
{
  let rows = ctx.repository.list_agents_for_user( ctx.user_id ).await
    .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

  let agents: Vec< Value > = rows.iter().map( |row|
  {
    let name = row.display_name.clone().or_else( || row.hostname.clone() ).unwrap_or_else( || "Unnamed Agent".to_string() );
    let last_seen: DateTime< Utc > = row.last_seen_at;
    json!( { "name": name, "os": row.os_type, "status": row.status, "lastSeen": last_seen.to_rfc3339() } )
  } ).collect();

  Ok( json!( { "content": [ { "type": "text", "text": serde_json::to_string( &agents ).unwrap_or_default() } ] } ) )
}
