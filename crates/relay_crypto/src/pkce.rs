//! §4.1 PKCE (RFC 7636), `S256` only.

use base64::{ engine::general_purpose::URL_SAFE_NO_PAD, Engine as _ };
use sha2::{ Digest, Sha256 };

use crate::token::constant_time_str_eq;

pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

#[ derive( Debug, Clone, Copy, PartialEq, Eq, thiserror::Error ) ]
pub enum PkceError
{
  #[ error( "code_verifier must be between {MIN_VERIFIER_LEN} and {MAX_VERIFIER_LEN} characters" ) ]
  InvalidLength,
  #[ error( "code_verifier contains characters outside the unreserved set" ) ]
  InvalidCharacters,
  #[ error( "only the S256 code_challenge_method is supported" ) ]
  UnsupportedMethod,
}

/// Validate a verifier's length and character set (`[A-Za-z0-9\-._~]`, RFC 7636 §4.1).
pub fn validate_verifier( verifier: &str ) -> Result< (), PkceError >
{
  let len = verifier.chars().count();
  if !( MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN ).contains( &len )
  {
    return Err( PkceError::InvalidLength );
  }

  let all_unreserved = verifier
    .bytes()
    .all( |b| b.is_ascii_alphanumeric() || matches!( b, b'-' | b'.' | b'_' | b'~' ) );

  if !all_unreserved
  {
    return Err( PkceError::InvalidCharacters );
  }

  Ok( () )
}

/// `challenge = BASE64URL(SHA256(verifier))`.
pub fn generate_s256_challenge( verifier: &str ) -> Result< String, PkceError >
{
  validate_verifier( verifier )?;
  let mut hasher = Sha256::new();
  hasher.update( verifier.as_bytes() );
  Ok( URL_SAFE_NO_PAD.encode( hasher.finalize() ) )
}

/// Verify a supplied `code_verifier` against the `code_challenge` stored at
/// authorization-code issuance time. Only `method = "S256"` is accepted (§4.1).
pub fn verify( stored_challenge: &str, verifier: &str, method: &str ) -> Result< bool, PkceError >
{
  if method != "S256"
  {
    return Err( PkceError::UnsupportedMethod );
  }

  let computed = generate_s256_challenge( verifier )?;
  Ok( constant_time_str_eq( &computed, stored_challenge ) )
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  /// RFC 7636 Appendix B vector.
  const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
  const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

  #[ test ]
  fn rfc7636_vector_verifies()
  {
    assert_eq!( generate_s256_challenge( RFC_VERIFIER ).unwrap(), RFC_CHALLENGE );
    assert!( verify( RFC_CHALLENGE, RFC_VERIFIER, "S256" ).unwrap() );
  }

  #[ test ]
  fn rejects_non_s256_methods()
  {
    assert_eq!( verify( RFC_CHALLENGE, RFC_VERIFIER, "plain" ), Err( PkceError::UnsupportedMethod ) );
  }

  #[ test ]
  fn verifier_length_boundaries()
  {
    let make = |len: usize| "a".repeat( len );
    assert_eq!( validate_verifier( &make( 42 ) ), Err( PkceError::InvalidLength ) );
    assert!( validate_verifier( &make( 43 ) ).is_ok() );
    assert!( validate_verifier( &make( 128 ) ).is_ok() );
    assert_eq!( validate_verifier( &make( 129 ) ), Err( PkceError::InvalidLength ) );
  }

  #[ test ]
  fn rejects_reserved_characters()
  {
    let verifier = format!( "{}{}", "a".repeat( 42 ), "!" );
    assert_eq!( validate_verifier( &verifier ), Err( PkceError::InvalidCharacters ) );
  }

  #[ test ]
  fn wrong_verifier_does_not_verify()
  {
    assert!( !verify( RFC_CHALLENGE, &"b".repeat( 43 ), "S256" ).unwrap() );
  }
}
