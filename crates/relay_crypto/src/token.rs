//! §4.1 Token codec.
//!
//! Opaque bearer tokens (`sc_at_…` access, `sc_rt_…` refresh, `sc_ac_…`
//! authorization code). The random body is 256 bits of CSPRNG output, base64url
//! without padding. Only the SHA-256 hash is ever persisted — plaintext is handed
//! back to the caller exactly once, at mint time.

use base64::{ engine::general_purpose::URL_SAFE_NO_PAD, Engine as _ };
use rand::RngCore;
use sha2::{ Digest, Sha256 };
use subtle::ConstantTimeEq;

/// Number of random bytes backing each token body (256 bits).
const TOKEN_BODY_BYTES: usize = 32;

/// §4.1 lifetimes, in seconds.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 2_592_000;
pub const AUTHORIZATION_CODE_TTL_SECS: i64 = 600;

#[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
pub enum TokenKind
{
  Access,
  Refresh,
  AuthorizationCode,
  ClientSecret,
  RegistrationAccessToken,
}

impl TokenKind
{
  #[ must_use ]
  pub fn prefix( self ) -> &'static str
  {
    match self
    {
      Self::Access => "sc_at_",
      Self::Refresh => "sc_rt_",
      Self::AuthorizationCode => "sc_ac_",
      Self::ClientSecret => "sc_cs_",
      Self::RegistrationAccessToken => "sc_rat_",
    }
  }
}

/// Mint a new opaque token of the given kind.
///
/// Returns the plaintext (shown to the caller once) — the caller is responsible for
/// calling [`hash_token`] before persisting anything.
#[ must_use ]
pub fn generate_token( kind: TokenKind ) -> String
{
  let mut bytes = [ 0u8; TOKEN_BODY_BYTES ];
  rand::thread_rng().fill_bytes( &mut bytes );
  format!( "{}{}", kind.prefix(), URL_SAFE_NO_PAD.encode( bytes ) )
}

/// SHA-256 over the plaintext token, hex-encoded. Deterministic, so it can back a
/// unique index for O(1) lookup — high-entropy random tokens need no salt and no
/// adaptive hash.
#[ must_use ]
pub fn hash_token( plaintext: &str ) -> String
{
  let mut hasher = Sha256::new();
  hasher.update( plaintext.as_bytes() );
  format!( "{:x}", hasher.finalize() )
}

/// Constant-time verification against a stored hash.
#[ must_use ]
pub fn verify_token_hash( plaintext: &str, stored_hash: &str ) -> bool
{
  let computed = hash_token( plaintext );
  constant_time_str_eq( &computed, stored_hash )
}

/// Constant-time string comparison, used everywhere a secret is compared against a
/// caller-supplied value (token hashes, PKCE challenges).
#[ must_use ]
pub fn constant_time_str_eq( a: &str, b: &str ) -> bool
{
  if a.len() != b.len()
  {
    return false;
  }
  a.as_bytes().ct_eq( b.as_bytes() ).into()
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn generated_tokens_carry_the_right_prefix()
  {
    assert!( generate_token( TokenKind::Access ).starts_with( "sc_at_" ) );
    assert!( generate_token( TokenKind::Refresh ).starts_with( "sc_rt_" ) );
    assert!( generate_token( TokenKind::AuthorizationCode ).starts_with( "sc_ac_" ) );
  }

  #[ test ]
  fn hash_is_deterministic_and_verifiable()
  {
    let token = generate_token( TokenKind::Access );
    let hash = hash_token( &token );
    assert_eq!( hash, hash_token( &token ) );
    assert!( verify_token_hash( &token, &hash ) );
    assert!( !verify_token_hash( "sc_at_wrong", &hash ) );
  }

  #[ test ]
  fn tokens_have_no_duplicate_collisions_across_many_draws()
  {
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000
    {
      assert!( seen.insert( generate_token( TokenKind::Access ) ) );
    }
  }
}
