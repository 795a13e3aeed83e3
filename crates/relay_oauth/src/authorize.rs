//! `GET /api/oauth/authorize` (§4.6).

use axum::extract::{ Query, State };
use axum::http::StatusCode;
use axum::response::{ IntoResponse, Json, Redirect };
use chrono::{ Duration, Utc };
use serde::Deserialize;
use serde_json::json;

use relay_crypto::{ generate_token, hash_token, TokenKind, AUTHORIZATION_CODE_TTL_SECS };
use relay_types::parse_scope_list;

use crate::audience::{ extract_endpoint_uuid, normalize };
use crate::session::SessionAuth;
use crate::state::OAuthState;

#[ derive( Debug, Deserialize ) ]
pub struct AuthorizeQuery
{
  pub response_type: String,
  pub client_id: String,
  pub redirect_uri: String,
  pub code_challenge: String,
  pub code_challenge_method: String,
  pub scope: String,
  pub state: String,
  pub resource: String,
}

type AuthorizeError = ( StatusCode, Json< serde_json::Value > );

fn oauth_error( status: StatusCode, error: &str, description: &str ) -> AuthorizeError
{
  ( status, Json( json!( { "error": error, "error_description": description } ) ) )
}

/// Percent-encodes a query component using the minimal reserved set the
/// redirect target needs protected (`&`, `=`, `#`, `%`, space).
fn percent_encode( raw: &str ) -> String
{
  let mut out = String::with_capacity( raw.len() );
  for byte in raw.bytes()
  {
    match byte
    {
      b'&' | b'=' | b'#' | b'%' | b' ' | b'+' => out.push_str( &format!( "%{byte:02X}" ) ),
      _ => out.push( byte as char ),
    }
  }
  out
}

pub async fn authorize(
  State( state ): State< OAuthState >,
  SessionAuth( session ): SessionAuth,
  Query( query ): Query< AuthorizeQuery >,
) -> Result< impl IntoResponse, AuthorizeError >
{
  if query.response_type != "code"
  {
    return Err( oauth_error( StatusCode::BAD_REQUEST, "unsupported_response_type", "response_type must be code" ) );
  }

  if query.code_challenge_method != "S256"
  {
    return Err( oauth_error( StatusCode::BAD_REQUEST, "invalid_request", "code_challenge_method must be S256" ) );
  }

  let client = state.repository.get_oauth_client( &query.client_id ).await
    .map_err( |e| oauth_error( StatusCode::INTERNAL_SERVER_ERROR, "server_error", &e.to_string() ) )?
    .ok_or_else( || oauth_error( StatusCode::BAD_REQUEST, "invalid_client", "unknown client_id" ) )?;

  let redirect_uris: Vec< String > = serde_json::from_str( &client.redirect_uris ).unwrap_or_default();
  if !redirect_uris.contains( &query.redirect_uri )
  {
    return Err( oauth_error( StatusCode::BAD_REQUEST, "invalid_request", "redirect_uri is not registered for this client" ) );
  }

  parse_scope_list( &query.scope )
    .map_err( |unknown| oauth_error( StatusCode::BAD_REQUEST, "invalid_scope", &format!( "unknown scopes: {}", unknown.join( ", " ) ) ) )?;

  let normalized_resource = normalize( &query.resource );
  let endpoint_uuid = extract_endpoint_uuid( &state.config.app_url, &normalized_resource )
    .ok_or_else( || oauth_error( StatusCode::BAD_REQUEST, "invalid_target", "resource does not name a tenant endpoint on this broker" ) )?;

  let connection = state.repository.get_mcp_connection_by_uuid( &endpoint_uuid ).await
    .map_err( |e| oauth_error( StatusCode::INTERNAL_SERVER_ERROR, "server_error", &e.to_string() ) )?
    .ok_or_else( || oauth_error( StatusCode::NOT_FOUND, "invalid_target", "no such tenant endpoint" ) )?;

  if connection.status != "ACTIVE"
  {
    return Err( oauth_error( StatusCode::FORBIDDEN, "access_denied", "tenant endpoint is revoked" ) );
  }

  let code = generate_token( TokenKind::AuthorizationCode );
  let code_hash = hash_token( &code );
  let expires_at = Utc::now() + Duration::seconds( AUTHORIZATION_CODE_TTL_SECS );

  state.repository.create_authorization_code(
    &code_hash,
    &client.client_id,
    &session.sub,
    &connection.id,
    &query.redirect_uri,
    &query.scope,
    &query.code_challenge,
    &normalized_resource,
    expires_at,
  )
  .await
  .map_err( |e| oauth_error( StatusCode::INTERNAL_SERVER_ERROR, "server_error", &e.to_string() ) )?;

  let separator = if query.redirect_uri.contains( '?' ) { '&' } else { '?' };
  let target = format!(
    "{}{separator}code={}&state={}",
    query.redirect_uri,
    percent_encode( &code ),
    percent_encode( &query.state ),
  );

  Ok( Redirect::to( &target ) )
}
