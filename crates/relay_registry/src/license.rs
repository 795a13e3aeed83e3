//! License state machine & projection (§4.3.1).

use chrono::{ DateTime, Utc };
use relay_types::{ AgentLifecycleState, LicenseStatus };
use relay_repository::models::LicenseRow;

/// Project `{active, pending, expired, blocked}` from an agent's lifecycle
/// state and its license row, highest-precedence rule first.
#[ must_use ]
pub fn project_license_status(
  agent_state: AgentLifecycleState,
  license: &LicenseRow,
  now: DateTime< Utc >,
) -> LicenseStatus
{
  match agent_state
  {
    AgentLifecycleState::Blocked => return LicenseStatus::Blocked,
    AgentLifecycleState::Expired => return LicenseStatus::Expired,
    AgentLifecycleState::Active => return LicenseStatus::Active,
    AgentLifecycleState::Pending => {}
  }

  match license.status.as_str()
  {
    "SUSPENDED" => LicenseStatus::Blocked,
    "EXPIRED" => LicenseStatus::Expired,
    "ACTIVE" =>
    {
      let expired = license.valid_until.is_some_and( |v| v < now )
        || ( license.is_trial && license.trial_ends.is_some_and( |t| t < now ) );
      if expired { LicenseStatus::Expired } else { LicenseStatus::Active }
    }
    _ => LicenseStatus::Pending,
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;
  use chrono::Duration;

  fn base_license() -> LicenseRow
  {
    LicenseRow
    {
      id: "lic_1".into(),
      user_id: "user_1".into(),
      license_key: "key".into(),
      product_type: "desktop".into(),
      status: "ACTIVE".into(),
      valid_until: None,
      is_trial: false,
      trial_started: None,
      trial_ends: None,
    }
  }

  #[ test ]
  fn agent_state_blocked_wins_over_license_row()
  {
    let mut license = base_license();
    license.status = "ACTIVE".into();
    assert_eq!(
      project_license_status( AgentLifecycleState::Blocked, &license, Utc::now() ),
      LicenseStatus::Blocked
    );
  }

  #[ test ]
  fn pending_agent_derives_active_from_effective_license()
  {
    let license = base_license();
    assert_eq!(
      project_license_status( AgentLifecycleState::Pending, &license, Utc::now() ),
      LicenseStatus::Active
    );
  }

  #[ test ]
  fn pending_agent_with_expired_trial_derives_expired()
  {
    let mut license = base_license();
    license.is_trial = true;
    license.trial_ends = Some( Utc::now() - Duration::days( 1 ) );
    assert_eq!(
      project_license_status( AgentLifecycleState::Pending, &license, Utc::now() ),
      LicenseStatus::Expired
    );
  }

  #[ test ]
  fn suspended_license_row_derives_blocked()
  {
    let mut license = base_license();
    license.status = "SUSPENDED".into();
    assert_eq!(
      project_license_status( AgentLifecycleState::Pending, &license, Utc::now() ),
      LicenseStatus::Blocked
    );
  }
}
