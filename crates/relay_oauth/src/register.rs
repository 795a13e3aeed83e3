//! `POST /api/oauth/register` — dynamic client registration (RFC 7591, §4.6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{ IntoResponse, Json };
use serde::{ Deserialize, Serialize };
use serde_json::json;

use relay_crypto::{ generate_token, hash_token, TokenKind };

use crate::state::OAuthState;

#[ derive( Debug, Deserialize ) ]
pub struct RegisterRequest
{
  pub redirect_uris: Vec< String >,
  #[ serde( default = "default_grant_types" ) ]
  pub grant_types: Vec< String >,
  #[ serde( default = "default_response_types" ) ]
  pub response_types: Vec< String >,
  #[ serde( default ) ]
  pub scope: String,
  #[ serde( default = "default_auth_method" ) ]
  pub token_endpoint_auth_method: String,
}

fn default_grant_types() -> Vec< String >
{
  vec![ "authorization_code".to_string() ]
}

fn default_response_types() -> Vec< String >
{
  vec![ "code".to_string() ]
}

fn default_auth_method() -> String
{
  "none".to_string()
}

#[ derive( Debug, Serialize ) ]
pub struct RegisterResponse
{
  pub client_id: String,
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub client_secret: Option< String >,
  pub redirect_uris: Vec< String >,
  pub grant_types: Vec< String >,
  pub response_types: Vec< String >,
  pub scope: String,
  pub token_endpoint_auth_method: String,
  pub registration_access_token: String,
}

type RegisterError = ( StatusCode, Json< serde_json::Value > );

fn bad_request( error: &str, description: &str ) -> RegisterError
{
  ( StatusCode::BAD_REQUEST, Json( json!( { "error": error, "error_description": description } ) ) )
}

fn redirect_uri_allowed( uri: &str ) -> bool
{
  if let Some( rest ) = uri.strip_prefix( "https://" )
  {
    return !rest.is_empty();
  }
  if let Some( rest ) = uri.strip_prefix( "http://" )
  {
    let host = rest.split( '/' ).next().unwrap_or( "" );
    let host_only = host.split( ':' ).next().unwrap_or( "" );
    return host_only == "127.0.0.1" || host_only == "localhost";
  }
  false
}

pub async fn register(
  State( state ): State< OAuthState >,
  Json( body ): Json< RegisterRequest >,
) -> Result< impl IntoResponse, RegisterError >
{
  if body.redirect_uris.is_empty() || !body.redirect_uris.iter().all( |u| redirect_uri_allowed( u ) )
  {
    return Err( bad_request(
      "invalid_redirect_uri",
      "redirect_uris must be https:// or http://127.0.0.1[:port]|localhost[:port]",
    ) );
  }

  if !body.grant_types.iter().all( |g| g == "authorization_code" || g == "refresh_token" )
  {
    return Err( bad_request( "invalid_client_metadata", "grant_types must be a subset of authorization_code, refresh_token" ) );
  }

  if body.response_types != vec![ "code".to_string() ]
  {
    return Err( bad_request( "invalid_client_metadata", "response_types must be exactly [\"code\"]" ) );
  }

  if body.token_endpoint_auth_method != "none" && body.token_endpoint_auth_method != "client_secret_post"
  {
    return Err( bad_request( "invalid_client_metadata", "token_endpoint_auth_method must be none or client_secret_post" ) );
  }

  let client_id = uuid::Uuid::new_v4().to_string();
  let is_confidential = body.token_endpoint_auth_method == "client_secret_post";

  let client_secret = is_confidential.then( || generate_token( TokenKind::ClientSecret ) );
  let client_secret_hash = client_secret.as_deref().map( hash_token );

  let registration_access_token = generate_token( TokenKind::RegistrationAccessToken );
  let registration_access_token_hash = hash_token( &registration_access_token );

  let redirect_uris_json = serde_json::to_string( &body.redirect_uris ).unwrap_or_default();
  let grant_types_json = serde_json::to_string( &body.grant_types ).unwrap_or_default();
  let response_types_json = serde_json::to_string( &body.response_types ).unwrap_or_default();
  let scopes_json = serde_json::to_string( &body.scope.split_whitespace().collect::< Vec< _ > >() ).unwrap_or_default();

  state.repository.create_oauth_client(
    &client_id,
    client_secret_hash.as_deref(),
    &redirect_uris_json,
    &grant_types_json,
    &response_types_json,
    &scopes_json,
    &body.token_endpoint_auth_method,
    &registration_access_token_hash,
  )
  .await
  .map_err( |e| ( StatusCode::INTERNAL_SERVER_ERROR, Json( json!( { "error": e.to_string() } ) ) ) )?;

  Ok( Json( RegisterResponse
  {
    client_id,
    client_secret,
    redirect_uris: body.redirect_uris,
    grant_types: body.grant_types,
    response_types: body.response_types,
    scope: body.scope,
    token_endpoint_auth_method: body.token_endpoint_auth_method,
    registration_access_token,
  } ) )
}
