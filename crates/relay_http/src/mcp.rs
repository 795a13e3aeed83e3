//! §4.7 — the `/mcp/{uuid}` pipeline: rate limiting, bearer auth, JSON-RPC
//! dispatch, and the SSE/DELETE/OPTIONS surface around it.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ ConnectInfo, Path, State };
use axum::http::{ HeaderMap, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use axum::routing::{ delete, get, post };
use axum::{ Json, Router };
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::auth::authorize;
use crate::rpc::{ dispatch, RpcContext };
use crate::state::HttpState;

const IP_WINDOW: Duration = Duration::from_secs( 60 );
const CONNECTION_WINDOW: Duration = Duration::from_secs( 60 );
const MCP_SESSION_HEADER: &str = "Mcp-Session-Id";

#[ must_use ]
pub fn router() -> Router< HttpState >
{
  Router::new()
    .route(
      "/mcp/:uuid",
      post( handle_post ).get( handle_get ).delete( handle_delete ),
    )
    .layer(
      CorsLayer::new()
        .allow_origin( tower_http::cors::Any )
        .allow_methods( [ axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::DELETE ] )
        .allow_headers( tower_http::cors::Any )
        .max_age( Duration::from_secs( 86_400 ) ),
    )
}

#[ derive( Debug, Deserialize ) ]
struct JsonRpcRequest
{
  #[ serde( default ) ]
  id: Option< Value >,
  method: String,
  #[ serde( default ) ]
  params: Value,
}

#[ derive( Debug, Serialize ) ]
struct JsonRpcErrorObject
{
  code: i64,
  message: String,
}

#[ derive( Debug, Serialize ) ]
struct JsonRpcResponse
{
  jsonrpc: &'static str,
  id: Value,
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  result: Option< Value >,
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  error: Option< JsonRpcErrorObject >,
}

/// Steps 1-5, shared by every method on `/mcp/{uuid}`: rate-limit by IP,
/// look up the connection, authorize the bearer token, rate-limit by
/// connection, then touch usage counters.
async fn admit(
  state: &HttpState,
  addr: SocketAddr,
  uuid: &str,
  bearer: Option< &str >,
) -> Result< crate::auth::AuthorizedRequest, Response >
{
  if let Err( limited ) = state.ip_limiter.check( &addr.ip().to_string(), crate::state::IP_RATE_LIMIT, IP_WINDOW )
  {
    return Err( rate_limited_response( limited.retry_after_secs ) );
  }

  let connection = match state.repository.get_mcp_connection_by_uuid( uuid ).await
  {
    Ok( Some( row ) ) => row,
    Ok( None ) => return Err( StatusCode::NOT_FOUND.into_response() ),
    Err( e ) => return Err( relay_types::BrokerError::Internal( e.to_string() ).into_response() ),
  };

  let authorized = authorize( &state.repository, bearer, &state.app_url, uuid, &connection ).await
    .map_err( IntoResponse::into_response )?;

  if let Err( limited ) = state.connection_limiter.check( &connection.id, crate::state::CONNECTION_RATE_LIMIT, CONNECTION_WINDOW )
  {
    return Err( rate_limited_response( limited.retry_after_secs ) );
  }

  let _ = state.repository.touch_access_token( &authorized.access_token.id ).await;
  let _ = state.repository.touch_mcp_connection( &connection.id ).await;

  Ok( authorized )
}

fn rate_limited_response( retry_after_secs: u64 ) -> Response
{
  relay_types::BrokerError::RateLimit { retry_after_secs }.into_response()
}

fn session_header( uuid: &str ) -> ( &'static str, HeaderValue )
{
  ( MCP_SESSION_HEADER, HeaderValue::from_str( uuid ).unwrap_or_else( |_| HeaderValue::from_static( "" ) ) )
}

async fn handle_post(
  State( state ): State< HttpState >,
  Path( uuid ): Path< String >,
  ConnectInfo( addr ): ConnectInfo< SocketAddr >,
  bearer: Option< TypedHeader< Authorization< Bearer > > >,
  body: axum::body::Bytes,
) -> Response
{
  let bearer_token = bearer.as_ref().map( |TypedHeader( auth ) | auth.token().to_string() );
  let authorized = match admit( &state, addr, &uuid, bearer_token.as_deref() ).await
  {
    Ok( authorized ) => authorized,
    Err( response ) => return response,
  };

  let request: JsonRpcRequest = match serde_json::from_slice( &body )
  {
    Ok( request ) => request,
    Err( _ ) =>
    {
      let error = JsonRpcResponse
      {
        jsonrpc: "2.0",
        id: Value::Null,
        result: None,
        error: Some( JsonRpcErrorObject { code: -32700, message: "parse error".into() } ),
      };
      return ( StatusCode::OK, [ session_header( &uuid ) ], Json( error ) ).into_response();
    }
  };

  let is_notification = matches!( request.id, None | Some( Value::Null ) );

  let ctx = RpcContext
  {
    repository: &state.repository,
    registry: &state.registry,
    user_id: &authorized.access_token.user_id,
    scopes: &authorized.scopes,
    ip_address: Some( addr.ip().to_string() ),
  };

  let outcome = dispatch( &ctx, &request.method, request.params ).await;

  if is_notification
  {
    return StatusCode::ACCEPTED.into_response();
  }

  let id = request.id.unwrap_or( Value::Null );
  let response = match outcome
  {
    Ok( result ) => JsonRpcResponse { jsonrpc: "2.0", id, result: Some( result ), error: None },
    Err( err ) => JsonRpcResponse
    {
      jsonrpc: "2.0",
      id,
      result: None,
      error: Some( JsonRpcErrorObject { code: err.json_rpc_code(), message: err.to_string() } ),
    },
  };

  ( StatusCode::OK, [ session_header( &uuid ) ], Json( response ) ).into_response()
}

async fn handle_get(
  State( state ): State< HttpState >,
  Path( uuid ): Path< String >,
  ConnectInfo( addr ): ConnectInfo< SocketAddr >,
  bearer: Option< TypedHeader< Authorization< Bearer > > >,
) -> Response
{
  let bearer_token = bearer.as_ref().map( |TypedHeader( auth ) | auth.token().to_string() );
  if let Err( response ) = admit( &state, addr, &uuid, bearer_token.as_deref() ).await
  {
    return response;
  }

  let mut headers = HeaderMap::new();
  headers.insert( MCP_SESSION_HEADER, HeaderValue::from_str( &uuid ).unwrap_or_else( |_| HeaderValue::from_static( "" ) ) );
  ( headers, crate::sse::stream() ).into_response()
}

async fn handle_delete(
  State( state ): State< HttpState >,
  Path( uuid ): Path< String >,
  ConnectInfo( addr ): ConnectInfo< SocketAddr >,
  bearer: Option< TypedHeader< Authorization< Bearer > > >,
) -> Response
{
  let bearer_token = bearer.as_ref().map( |TypedHeader( auth ) | auth.token().to_string() );
  if let Err( response ) = admit( &state, addr, &uuid, bearer_token.as_deref() ).await
  {
    return response;
  }
  StatusCode::NO_CONTENT.into_response()
}
