//! Dev-only session login harness for exercising the `/authorize` step
//! without a login UI (§4.6 says `/authorize` "authenticates user (session
//! cookie)"; building that UI is out of scope).
//!
//! `POST /session/login` is only mounted when [`crate::state::OAuthConfig::dev_session_enabled`]
//! is set — this is a test harness, not a product surface.

use axum::extract::{ FromRef, FromRequestParts, State };
use axum::http::{ header, request::Parts, StatusCode };
use axum::response::{ IntoResponse, Json };
use axum::routing::post;
use axum::Router;
use jsonwebtoken::{ decode, encode, DecodingKey, EncodingKey, Header, Validation };
use serde::{ Deserialize, Serialize };
use serde_json::json;

use crate::state::OAuthState;

const SESSION_TTL_SECS: i64 = 3600;
const SESSION_COOKIE_NAME: &str = "relay_session";

#[ derive( Debug, Serialize, Deserialize, Clone ) ]
pub struct SessionClaims
{
  pub sub: String,
  pub email: String,
  pub iat: i64,
  pub exp: i64,
}

#[ derive( Debug, Deserialize ) ]
pub struct LoginRequest
{
  pub email: String,
}

#[ derive( Debug, Serialize ) ]
pub struct LoginResponse
{
  pub session_token: String,
  pub expires_in: i64,
}

async fn login(
  State( state ): State< OAuthState >,
  Json( body ): Json< LoginRequest >,
) -> Result< impl IntoResponse, ( StatusCode, Json< serde_json::Value > ) >
{
  if !state.config.dev_session_enabled
  {
    return Err( ( StatusCode::NOT_FOUND, Json( json!( { "error": "not_found" } ) ) ) );
  }

  let user = state.repository.ensure_user_by_email( &body.email ).await
    .map_err( |e| ( StatusCode::INTERNAL_SERVER_ERROR, Json( json!( { "error": e.to_string() } ) ) ) )?;

  let now = chrono::Utc::now().timestamp();
  let claims = SessionClaims { sub: user.id, email: user.email, iat: now, exp: now + SESSION_TTL_SECS };
  let token = encode(
    &Header::default(),
    &claims,
    &EncodingKey::from_secret( state.config.session_signing_key.as_bytes() ),
  )
  .map_err( |e| ( StatusCode::INTERNAL_SERVER_ERROR, Json( json!( { "error": e.to_string() } ) ) ) )?;

  Ok( Json( LoginResponse { session_token: token, expires_in: SESSION_TTL_SECS } ) )
}

#[ must_use ]
pub fn router() -> Router< OAuthState >
{
  Router::new().route( "/session/login", post( login ) )
}

/// Extracts and verifies the dev session cookie; stands in for a real login
/// UI ahead of the `/authorize` redirect.
pub struct SessionAuth( pub SessionClaims );

#[ axum::async_trait ]
impl< S > FromRequestParts< S > for SessionAuth
where
  S: Send + Sync,
  OAuthState: FromRef< S >,
{
  type Rejection = ( StatusCode, Json< serde_json::Value > );

  async fn from_request_parts( parts: &mut Parts, state: &S ) -> Result< Self, Self::Rejection >
  {
    let oauth_state = OAuthState::from_ref( state );

    let cookie_header = parts.headers.get( header::COOKIE ).and_then( |h| h.to_str().ok() ).unwrap_or( "" );
    let prefix = format!( "{SESSION_COOKIE_NAME}=" );
    let token = cookie_header
      .split( ';' )
      .map( str::trim )
      .find_map( |kv| kv.strip_prefix( prefix.as_str() ) )
      .ok_or_else( || ( StatusCode::UNAUTHORIZED, Json( json!( { "error": "login_required" } ) ) ) )?;

    let data = decode::< SessionClaims >(
      token,
      &DecodingKey::from_secret( oauth_state.config.session_signing_key.as_bytes() ),
      &Validation::default(),
    )
    .map_err( |_| ( StatusCode::UNAUTHORIZED, Json( json!( { "error": "invalid_session" } ) ) ) )?;

    Ok( SessionAuth( data.claims ) )
  }
}
