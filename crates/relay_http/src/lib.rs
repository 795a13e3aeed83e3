//! Tenant endpoint (§4.7): JSON-RPC dispatch, SSE, fixed-window rate limiting.

pub mod auth;
pub mod health;
pub mod mcp;
pub mod rate_limit;
pub mod rpc;
pub mod sse;
pub mod state;

use axum::routing::get;
use axum::Router;

pub use state::HttpState;

/// Mounts `/health` and the `/mcp/{uuid}` pipeline. `relay_server` nests this
/// alongside the OAuth router and the agent socket handler.
#[ must_use ]
pub fn router( state: HttpState ) -> Router
{
  Router::new()
    .route( "/health", get( health::health_check ) )
    .merge( mcp::router() )
    .with_state( state )
}
