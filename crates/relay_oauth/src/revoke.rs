//! `POST /api/oauth/revoke` (§4.6) — idempotent, token-type agnostic (RFC 7009).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;

use relay_crypto::hash_token;

use crate::state::OAuthState;

#[ derive( Debug, Deserialize ) ]
pub struct RevokeRequest
{
  pub token: String,
}

pub async fn revoke( State( state ): State< OAuthState >, axum::Form( body ): axum::Form< RevokeRequest > ) -> impl IntoResponse
{
  let hash = hash_token( &body.token );

  let access_token_hash = if let Ok( Some( row ) ) = state.repository.get_access_token_by_hash( &hash ).await
  {
    Some( row.access_token_hash )
  }
  else if let Ok( Some( row ) ) = state.repository.get_access_token_by_refresh_hash( &hash ).await
  {
    Some( row.access_token_hash )
  }
  else
  {
    None
  };

  if let Some( access_token_hash ) = access_token_hash
  {
    let _ = state.repository.revoke_access_token( &access_token_hash ).await;
  }

  StatusCode::OK
}
