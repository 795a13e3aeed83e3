//! Clock & ID service plus the token/PKCE codec (§4.1, §2).

pub mod clock;
pub mod pkce;
pub mod token;

pub use clock::{ new_id, Clock, FixedClock, SystemClock };
pub use pkce::{ generate_s256_challenge, validate_verifier, verify as verify_pkce, PkceError, MAX_VERIFIER_LEN, MIN_VERIFIER_LEN };
pub use token::{
  constant_time_str_eq, generate_token, hash_token, verify_token_hash, TokenKind,
  ACCESS_TOKEN_TTL_SECS, AUTHORIZATION_CODE_TTL_SECS, REFRESH_TOKEN_TTL_SECS,
};
