//! Row types for the persistent entities (§3.1). Each mirrors its table
//! column-for-column; enum/id parsing happens at the boundary in `repository.rs`
//! rather than here so `sqlx::FromRow` can derive directly off primitives.

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct UserRow
{
  pub id: String,
  pub email: String,
  pub name: Option< String >,
  pub account_status: String,
  pub created_at: DateTime< Utc >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct LicenseRow
{
  pub id: String,
  pub user_id: String,
  pub license_key: String,
  pub product_type: String,
  pub status: String,
  pub valid_until: Option< DateTime< Utc > >,
  pub is_trial: bool,
  pub trial_started: Option< DateTime< Utc > >,
  pub trial_ends: Option< DateTime< Utc > >,
}

impl LicenseRow
{
  /// §4.3.1 — effectiveness check folded into the ACTIVE branch of the
  /// license-status projection.
  #[ must_use ]
  pub fn is_effective( &self, now: DateTime< Utc > ) -> bool
  {
    if self.status != "ACTIVE"
    {
      return false;
    }
    if let Some( valid_until ) = self.valid_until
    {
      if valid_until < now
      {
        return false;
      }
    }
    if self.is_trial
    {
      if let Some( trial_ends ) = self.trial_ends
      {
        if trial_ends < now
        {
          return false;
        }
      }
    }
    true
  }
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct AgentRow
{
  pub id: String,
  pub license_id: String,
  pub owner_user_id: String,
  pub agent_key: String,
  pub customer_id: Option< String >,
  pub machine_id: Option< String >,
  pub machine_fingerprint: Option< String >,
  pub fingerprint_raw: Option< String >,
  pub hostname: Option< String >,
  pub display_name: Option< String >,
  pub os_type: String,
  pub os_version: Option< String >,
  pub arch: Option< String >,
  pub agent_version: Option< String >,
  pub ip_address: Option< String >,
  pub status: String,
  pub state: String,
  pub power_state: String,
  pub is_screen_locked: bool,
  pub current_task: Option< String >,
  pub license_uuid: Option< String >,
  pub first_seen_at: DateTime< Utc >,
  pub last_seen_at: DateTime< Utc >,
  pub last_activity: DateTime< Utc >,
  pub activated_at: Option< DateTime< Utc > >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct AgentSessionRow
{
  pub id: String,
  pub agent_id: String,
  pub session_start: DateTime< Utc >,
  pub session_end: Option< DateTime< Utc > >,
  pub duration_minutes: Option< i64 >,
  pub ip_address: String,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct CommandLogRow
{
  pub id: String,
  pub agent_id: String,
  pub ai_connection_id: Option< String >,
  pub method: String,
  pub tool_name: Option< String >,
  pub params: String,
  pub status: String,
  pub result: Option< String >,
  pub error_message: Option< String >,
  pub started_at: DateTime< Utc >,
  pub completed_at: Option< DateTime< Utc > >,
  pub duration_ms: Option< i64 >,
  pub ip_address: Option< String >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct McpConnectionRow
{
  pub id: String,
  pub user_id: String,
  pub endpoint_uuid: String,
  pub name: String,
  pub status: String,
  pub total_requests: i64,
  pub last_used_at: Option< DateTime< Utc > >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct OAuthClientRow
{
  pub client_id: String,
  pub client_secret_hash: Option< String >,
  pub redirect_uris: String,
  pub grant_types: String,
  pub response_types: String,
  pub scopes: String,
  pub token_endpoint_auth_method: String,
  pub registration_access_token_hash: Option< String >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct OAuthAuthorizationCodeRow
{
  pub code_hash: String,
  pub client_id: String,
  pub user_id: String,
  pub connection_id: String,
  pub redirect_uri: String,
  pub scope: String,
  pub code_challenge: String,
  pub code_challenge_method: String,
  pub audience: String,
  pub expires_at: DateTime< Utc >,
  pub consumed_at: Option< DateTime< Utc > >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct OAuthAccessTokenRow
{
  pub id: String,
  pub access_token_hash: String,
  pub user_id: String,
  pub connection_id: String,
  pub client_id: String,
  pub scope: String,
  pub audience: String,
  pub access_expires_at: DateTime< Utc >,
  pub refresh_token_hash: Option< String >,
  pub refresh_expires_at: Option< DateTime< Utc > >,
  pub revoked_at: Option< DateTime< Utc > >,
  pub last_used_at: Option< DateTime< Utc > >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct AiConnectionRow
{
  pub session_id: String,
  pub user_id: String,
  pub client_name: Option< String >,
  pub client_version: Option< String >,
  pub is_active: bool,
  pub authorized_at: Option< DateTime< Utc > >,
  pub disconnected_at: Option< DateTime< Utc > >,
  pub last_activity_at: DateTime< Utc >,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct AgentVersionRow
{
  pub channel: String,
  pub version: String,
  pub min_version: Option< String >,
  pub rollout_percent: i64,
}

#[ derive( Debug, Clone, sqlx::FromRow ) ]
pub struct AgentBuildRow
{
  pub channel: String,
  pub platform_arch: String,
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct CustomerActivityPattern
{
  pub user_id: String,
  pub hourly_activity: [ i64; 24 ],
  pub quiet_hours_start: Option< i64 >,
  pub quiet_hours_end: Option< i64 >,
}
