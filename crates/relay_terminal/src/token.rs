//! §4.10 `createSessionToken` — one-shot, 5-minute-TTL viewer handoff tokens.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{ DateTime, Duration, Utc };
use rand::RngCore;

const TOKEN_TTL_MINUTES: i64 = 5;
const TOKEN_BYTES: usize = 32;

#[ derive( Debug, Clone ) ]
pub struct SessionTokenClaim
{
  pub agent_db_id: String,
  pub user_id: String,
  pub remote_address: String,
  pub expires_at: DateTime< Utc >,
}

/// In-memory one-shot token store. Stale entries expire lazily: a lookup
/// past `expiresAt` is treated as absent and removed on the spot.
pub struct TokenStore
{
  tokens: Mutex< HashMap< String, SessionTokenClaim > >,
}

impl TokenStore
{
  #[ must_use ]
  pub fn new() -> Self
  {
    Self { tokens: Mutex::new( HashMap::new() ) }
  }

  /// §4.10 `createSessionToken({agentId,userId,remoteAddress})`.
  #[ must_use ]
  pub fn create( &self, agent_db_id: String, user_id: String, remote_address: String ) -> ( String, DateTime< Utc > )
  {
    let mut bytes = [ 0u8; TOKEN_BYTES ];
    rand::thread_rng().fill_bytes( &mut bytes );
    let token: String = bytes.iter().map( |b| format!( "{b:02x}" ) ).collect();

    let expires_at = Utc::now() + Duration::minutes( TOKEN_TTL_MINUTES );
    self.tokens.lock().unwrap().insert( token.clone(), SessionTokenClaim { agent_db_id, user_id, remote_address, expires_at } );
    ( token, expires_at )
  }

  /// Validates and deletes `token` (one-shot). Lazily drops it instead of
  /// returning it if it has already expired.
  #[ must_use ]
  pub fn consume( &self, token: &str ) -> Option< SessionTokenClaim >
  {
    let mut tokens = self.tokens.lock().unwrap();
    let claim = tokens.remove( token )?;
    if claim.expires_at < Utc::now()
    {
      None
    }
    else
    {
      Some( claim )
    }
  }
}

impl Default for TokenStore
{
  fn default() -> Self
  {
    Self::new()
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn a_token_can_only_be_consumed_once()
  {
    let store = TokenStore::new();
    let ( token, _expires_at ) = store.create( "agent_1".into(), "user_1".into(), "127.0.0.1".into() );
    assert!( store.consume( &token ).is_some() );
    assert!( store.consume( &token ).is_none() );
  }

  #[ test ]
  fn an_expired_token_is_treated_as_absent()
  {
    let store = TokenStore::new();
    let ( token, _expires_at ) = store.create( "agent_1".into(), "user_1".into(), "127.0.0.1".into() );
    store.tokens.lock().unwrap().get_mut( &token ).unwrap().expires_at = Utc::now() - Duration::seconds( 1 );
    assert!( store.consume( &token ).is_none() );
  }
}
