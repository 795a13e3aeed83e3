//! Shared state every OAuth route handler extracts from (§4.6).

use relay_repository::Repository;

/// Static configuration the OAuth server needs beyond the repository.
/// Constructed once by `relay_server` from its top-level `Config`.
#[ derive( Debug, Clone ) ]
pub struct OAuthConfig
{
  /// Used as the `issuer` field in the metadata documents and to validate
  /// that a `resource` parameter actually points at this broker.
  pub app_url: String,
  /// Gates `POST /session/login` (the dev-only session harness).
  pub dev_session_enabled: bool,
  /// HMAC signing key for the dev session JWT. Irrelevant when
  /// `dev_session_enabled` is false.
  pub session_signing_key: String,
}

#[ derive( Clone ) ]
pub struct OAuthState
{
  pub repository: Repository,
  pub config: OAuthConfig,
}
