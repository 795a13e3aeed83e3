//! OAuth 2.1 authorization server (§4.6): dynamic client registration,
//! authorization-code + PKCE, refresh rotation, revocation, and the
//! discovery documents the tenant endpoint's clients bootstrap from.

pub mod audience;
pub mod authorize;
pub mod metadata;
pub mod register;
pub mod revoke;
pub mod session;
pub mod state;
pub mod token;

use axum::routing::{ get, post };
use axum::Router;

pub use state::{ OAuthConfig, OAuthState };

/// Mounts every OAuth route under its §6.3 path. `relay_server` nests this
/// into the top-level router.
#[ must_use ]
pub fn router( state: OAuthState ) -> Router
{
  Router::new()
    .route( "/.well-known/oauth-authorization-server", get( metadata::authorization_server_metadata ) )
    .route( "/.well-known/oauth-protected-resource", get( metadata::protected_resource_metadata ) )
    .route( "/api/oauth/register", post( register::register ) )
    .route( "/api/oauth/authorize", get( authorize::authorize ) )
    .route( "/api/oauth/token", post( token::token ) )
    .route( "/api/oauth/revoke", post( revoke::revoke ) )
    .merge( session::router() )
    .with_state( state )
}
