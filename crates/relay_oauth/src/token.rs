//! `POST /api/oauth/token` (§4.6): authorization_code and refresh_token grants.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{ IntoResponse, Json };
use chrono::{ Duration, Utc };
use serde::{ Deserialize, Serialize };
use serde_json::json;

use relay_crypto::{
  generate_token, hash_token, verify_pkce, TokenKind, ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS,
};

use crate::state::OAuthState;

#[ derive( Debug, Deserialize ) ]
pub struct TokenRequest
{
  pub grant_type: String,
  pub code: Option< String >,
  pub redirect_uri: Option< String >,
  pub client_id: Option< String >,
  pub code_verifier: Option< String >,
  pub refresh_token: Option< String >,
}

#[ derive( Debug, Serialize ) ]
pub struct TokenResponse
{
  pub access_token: String,
  pub token_type: String,
  pub expires_in: i64,
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub refresh_token: Option< String >,
  pub scope: String,
}

type TokenError = ( StatusCode, Json< serde_json::Value > );

fn invalid_grant( description: &str ) -> TokenError
{
  ( StatusCode::BAD_REQUEST, Json( json!( { "error": "invalid_grant", "error_description": description } ) ) )
}

fn invalid_request( description: &str ) -> TokenError
{
  ( StatusCode::BAD_REQUEST, Json( json!( { "error": "invalid_request", "error_description": description } ) ) )
}

fn server_error( description: &str ) -> TokenError
{
  ( StatusCode::INTERNAL_SERVER_ERROR, Json( json!( { "error": "server_error", "error_description": description } ) ) )
}

pub async fn token(
  State( state ): State< OAuthState >,
  axum::Form( body ): axum::Form< TokenRequest >,
) -> Result< impl IntoResponse, TokenError >
{
  match body.grant_type.as_str()
  {
    "authorization_code" => authorization_code_grant( &state, body ).await,
    "refresh_token" => refresh_token_grant( &state, body ).await,
    other => Err( ( StatusCode::BAD_REQUEST, Json( json!( { "error": "unsupported_grant_type", "error_description": other } ) ) ) ),
  }
}

async fn authorization_code_grant( state: &OAuthState, body: TokenRequest ) -> Result< Json< TokenResponse >, TokenError >
{
  let code = body.code.ok_or_else( || invalid_request( "code is required" ) )?;
  let redirect_uri = body.redirect_uri.ok_or_else( || invalid_request( "redirect_uri is required" ) )?;
  let client_id = body.client_id.ok_or_else( || invalid_request( "client_id is required" ) )?;
  let code_verifier = body.code_verifier.ok_or_else( || invalid_request( "code_verifier is required" ) )?;

  let code_hash = hash_token( &code );
  let row = state.repository.get_authorization_code( &code_hash ).await
    .map_err( |e| server_error( &e.to_string() ) )?
    .ok_or_else( || invalid_grant( "unknown authorization code" ) )?;

  if row.consumed_at.is_some()
  {
    return Err( invalid_grant( "authorization code already used" ) );
  }
  if row.expires_at < Utc::now()
  {
    return Err( invalid_grant( "authorization code expired" ) );
  }
  if row.client_id != client_id
  {
    return Err( invalid_grant( "client_id does not match the authorization request" ) );
  }
  if row.redirect_uri != redirect_uri
  {
    return Err( invalid_grant( "redirect_uri does not match the authorization request" ) );
  }

  let verified = verify_pkce( &row.code_challenge, &code_verifier, &row.code_challenge_method )
    .map_err( |e| invalid_grant( &e.to_string() ) )?;
  if !verified
  {
    return Err( invalid_grant( "code_verifier does not match code_challenge" ) );
  }

  let client = state.repository.get_oauth_client( &client_id ).await
    .map_err( |e| server_error( &e.to_string() ) )?
    .ok_or_else( || invalid_grant( "unknown client_id" ) )?;
  let grant_types: Vec< String > = serde_json::from_str( &client.grant_types ).unwrap_or_default();
  let issue_refresh = grant_types.iter().any( |g| g == "refresh_token" );

  let access_token = generate_token( TokenKind::Access );
  let access_token_hash = hash_token( &access_token );
  let access_expires_at = Utc::now() + Duration::seconds( ACCESS_TOKEN_TTL_SECS );

  let refresh_token = issue_refresh.then( || generate_token( TokenKind::Refresh ) );
  let refresh_token_hash = refresh_token.as_deref().map( hash_token );
  let refresh_expires_at = issue_refresh.then( || Utc::now() + Duration::seconds( REFRESH_TOKEN_TTL_SECS ) );

  state.repository.consume_code_and_issue_token(
    &code_hash,
    &access_token_hash,
    refresh_token_hash.as_deref(),
    &row.user_id,
    &row.connection_id,
    &client_id,
    &row.scope,
    &row.audience,
    access_expires_at,
    refresh_expires_at,
  )
  .await
  .map_err( |e| invalid_grant( &e.to_string() ) )?;

  Ok( Json( TokenResponse
  {
    access_token,
    token_type: "Bearer".to_string(),
    expires_in: ACCESS_TOKEN_TTL_SECS,
    refresh_token,
    scope: row.scope,
  } ) )
}

async fn refresh_token_grant( state: &OAuthState, body: TokenRequest ) -> Result< Json< TokenResponse >, TokenError >
{
  let refresh_token = body.refresh_token.ok_or_else( || invalid_request( "refresh_token is required" ) )?;
  let refresh_token_hash = hash_token( &refresh_token );

  let row = state.repository.get_access_token_by_refresh_hash( &refresh_token_hash ).await
    .map_err( |e| server_error( &e.to_string() ) )?
    .ok_or_else( || invalid_grant( "unknown refresh token" ) )?;

  if row.revoked_at.is_some()
  {
    return Err( invalid_grant( "refresh token revoked" ) );
  }
  if row.refresh_expires_at.map_or( true, |exp| exp < Utc::now() )
  {
    return Err( invalid_grant( "refresh token expired" ) );
  }

  let new_access_token = generate_token( TokenKind::Access );
  let new_access_token_hash = hash_token( &new_access_token );
  let new_refresh_token = generate_token( TokenKind::Refresh );
  let new_refresh_token_hash = hash_token( &new_refresh_token );
  let access_expires_at = Utc::now() + Duration::seconds( ACCESS_TOKEN_TTL_SECS );
  let refresh_expires_at = Utc::now() + Duration::seconds( REFRESH_TOKEN_TTL_SECS );

  state.repository.rotate_refresh_token(
    &refresh_token_hash,
    &new_access_token_hash,
    &new_refresh_token_hash,
    &row.user_id,
    &row.connection_id,
    &row.client_id,
    &row.scope,
    &row.audience,
    access_expires_at,
    refresh_expires_at,
  )
  .await
  .map_err( |e| server_error( &e.to_string() ) )?;

  Ok( Json( TokenResponse
  {
    access_token: new_access_token,
    token_type: "Bearer".to_string(),
    expires_in: ACCESS_TOKEN_TTL_SECS,
    refresh_token: Some( new_refresh_token ),
    scope: row.scope,
  } ) )
}
