//! Bearer-token validation and audience binding (§4.7 step 3).

use chrono::Utc;
use relay_crypto::hash_token;
use relay_repository::models::{ McpConnectionRow, OAuthAccessTokenRow };
use relay_repository::Repository;
use relay_types::{ parse_scope_list, BrokerError, Scope };

pub struct AuthorizedRequest
{
  pub access_token: OAuthAccessTokenRow,
  pub scopes: Vec< Scope >,
}

impl AuthorizedRequest
{
  #[ must_use ]
  pub fn has_scope( &self, scope: Scope ) -> bool
  {
    self.scopes.contains( &scope )
  }
}

fn normalize( audience: &str ) -> String
{
  audience.trim_end_matches( '/' ).to_string()
}

/// Validates the bearer token against §3.3's access-token invariant: not
/// revoked, not expired, bound to `connection` by id, and audience-matched to
/// `app_url + "/mcp/" + endpoint_uuid` after trailing-slash normalization.
///
/// # Errors
/// [`BrokerError::Auth`] on a missing/invalid/expired token,
/// [`BrokerError::Scope`] when the token's audience doesn't name this endpoint.
pub async fn authorize(
  repository: &Repository,
  bearer: Option< &str >,
  app_url: &str,
  endpoint_uuid: &str,
  connection: &McpConnectionRow,
) -> Result< AuthorizedRequest, BrokerError >
{
  let token = bearer.ok_or_else( || BrokerError::Auth( "missing bearer token".into() ) )?;
  let hash = hash_token( token );

  let row = repository.get_access_token_by_hash( &hash ).await
    .map_err( |e| BrokerError::Internal( e.to_string() ) )?
    .ok_or_else( || BrokerError::Auth( "invalid token".into() ) )?;

  if row.revoked_at.is_some()
  {
    return Err( BrokerError::Auth( "token revoked".into() ) );
  }
  if row.access_expires_at < Utc::now()
  {
    return Err( BrokerError::Auth( "token expired".into() ) );
  }
  if row.connection_id != connection.id
  {
    return Err( BrokerError::Scope( "token is not bound to this connection".into() ) );
  }
  if connection.status != "ACTIVE"
  {
    return Err( BrokerError::Scope( "connection is revoked".into() ) );
  }

  let expected_audience = format!( "{app_url}/mcp/{endpoint_uuid}" );
  if normalize( &row.audience ) != normalize( &expected_audience )
  {
    return Err( BrokerError::Scope( "token audience does not match this endpoint".into() ) );
  }

  let scopes = parse_scope_list( &row.scope ).unwrap_or_default();
  Ok( AuthorizedRequest { access_token: row, scopes } )
}
