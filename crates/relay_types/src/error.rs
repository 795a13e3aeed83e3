//! §7 error taxonomy, shared by every wire-facing crate.
//!
//! `BrokerError` is the single type route handlers and the socket reader convert
//! their crate-local errors into. It knows how to render itself as either an HTTP
//! response (tenant endpoint, OAuth server) or a JSON-RPC error object (tools/call).

use axum::http::{ header, HeaderName, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use serde::Serialize;

static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static( "x-ratelimit-remaining" );

#[ derive( Debug, Clone, thiserror::Error ) ]
pub enum BrokerError
{
  #[ error( "malformed request: {0}" ) ]
  Protocol( String ),

  #[ error( "method not found: {0}" ) ]
  MethodNotFound( String ),

  #[ error( "unauthorized: {0}" ) ]
  Auth( String ),

  #[ error( "insufficient scope: {0}" ) ]
  Scope( String ),

  #[ error( "rate limited, retry after {retry_after_secs}s" ) ]
  RateLimit { retry_after_secs: u64 },

  #[ error( "not found: {0}" ) ]
  NotFound( String ),

  #[ error( "precondition failed: {0}" ) ]
  Precondition( String ),

  #[ error( "request timed out: {0}" ) ]
  Timeout( String ),

  #[ error( "internal error: {0}" ) ]
  Internal( String ),
}

impl BrokerError
{
  /// JSON-RPC 2.0 error code for this error kind (§7 / §4.7 step 6).
  #[ must_use ]
  pub fn json_rpc_code( &self ) -> i64
  {
    match self
    {
      Self::Protocol( _ ) => -32700,
      Self::MethodNotFound( _ ) => -32601,
      Self::Auth( _ ) | Self::Scope( _ ) | Self::RateLimit { .. } | Self::NotFound( _ ) |
      Self::Precondition( _ ) | Self::Timeout( _ ) | Self::Internal( _ ) => -32603,
    }
  }

  #[ must_use ]
  pub fn http_status( &self ) -> StatusCode
  {
    match self
    {
      Self::Protocol( _ ) => StatusCode::BAD_REQUEST,
      Self::MethodNotFound( _ ) | Self::NotFound( _ ) => StatusCode::NOT_FOUND,
      Self::Auth( _ ) => StatusCode::UNAUTHORIZED,
      Self::Scope( _ ) => StatusCode::FORBIDDEN,
      Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
      Self::Precondition( _ ) | Self::Timeout( _ ) => StatusCode::OK, // surfaced as JSON-RPC error, not HTTP failure
      Self::Internal( _ ) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[ derive( Debug, Serialize ) ]
pub struct JsonRpcErrorBody
{
  pub code: i64,
  pub message: String,
}

impl From< &BrokerError > for JsonRpcErrorBody
{
  fn from( err: &BrokerError ) -> Self
  {
    Self { code: err.json_rpc_code(), message: err.to_string() }
  }
}

impl IntoResponse for BrokerError
{
  fn into_response( self ) -> Response
  {
    let status = self.http_status();
    let mut response = axum::Json( JsonRpcErrorBody::from( &self ) ).into_response();
    *response.status_mut() = status;

    match &self
    {
      Self::Auth( _ ) =>
      {
        response.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static( r#"Bearer realm="mcp", error="invalid_token""# ),
        );
      }
      Self::Scope( _ ) =>
      {
        response.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static( r#"Bearer realm="mcp", error="insufficient_scope""# ),
        );
      }
      Self::RateLimit { retry_after_secs } =>
      {
        if let Ok( value ) = HeaderValue::from_str( &retry_after_secs.to_string() )
        {
          response.headers_mut().insert( header::RETRY_AFTER, value );
        }
        response.headers_mut().insert( X_RATELIMIT_REMAINING.clone(), HeaderValue::from_static( "0" ) );
      }
      _ => {}
    }

    response
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn json_rpc_codes_match_spec_defaults()
  {
    assert_eq!( BrokerError::Protocol( "x".into() ).json_rpc_code(), -32700 );
    assert_eq!( BrokerError::MethodNotFound( "x".into() ).json_rpc_code(), -32601 );
    assert_eq!( BrokerError::Internal( "x".into() ).json_rpc_code(), -32603 );
  }
}
