//! `/.well-known/oauth-authorization-server` and `/.well-known/oauth-protected-resource` (§6.3).

use axum::extract::State;
use axum::response::Json;
use serde_json::{ json, Value };

use crate::state::OAuthState;

pub async fn authorization_server_metadata( State( state ): State< OAuthState > ) -> Json< Value >
{
  let issuer = &state.config.app_url;
  Json( json!( {
    "issuer": issuer,
    "authorization_endpoint": format!( "{issuer}/api/oauth/authorize" ),
    "token_endpoint": format!( "{issuer}/api/oauth/token" ),
    "registration_endpoint": format!( "{issuer}/api/oauth/register" ),
    "revocation_endpoint": format!( "{issuer}/api/oauth/revoke" ),
    "response_types_supported": [ "code" ],
    "grant_types_supported": [ "authorization_code", "refresh_token" ],
    "code_challenge_methods_supported": [ "S256" ],
    "token_endpoint_auth_methods_supported": [ "none", "client_secret_post" ],
    "scopes_supported": [ "mcp:tools", "mcp:resources", "mcp:prompts", "mcp:agents:read", "mcp:agents:write" ],
  } ) )
}

pub async fn protected_resource_metadata( State( state ): State< OAuthState > ) -> Json< Value >
{
  Json( json!( {
    "resource": state.config.app_url,
    "authorization_servers": [ state.config.app_url ],
  } ) )
}
