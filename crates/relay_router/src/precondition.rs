//! §4.4 precondition check, run before any tool forward reaches `sendCommand`.

use relay_types::{ AgentLifecycleState, BrokerError, LicenseStatus };

const PENDING_ALLOWED_METHODS: &[ &str ] = &[ "ping", "status", "getInfo" ];
const SCREEN_LOCKED_ALLOWED_METHODS: &[ &str ] =
  &[ "ping", "status", "getInfo", "fs_list", "fs_read", "shell_exec" ];

/// # Errors
/// Returns the first failing [`BrokerError::Precondition`] in table order.
pub fn check(
  state: AgentLifecycleState,
  license_status: LicenseStatus,
  is_screen_locked: bool,
  method: &str,
) -> Result< (), BrokerError >
{
  if state == AgentLifecycleState::Blocked
  {
    return Err( BrokerError::Precondition( "Agent is blocked".into() ) );
  }
  if state == AgentLifecycleState::Expired
  {
    return Err( BrokerError::Precondition( "License expired".into() ) );
  }
  if license_status != LicenseStatus::Active
  {
    return Err( BrokerError::Precondition( "License not active".into() ) );
  }
  if state == AgentLifecycleState::Pending && !PENDING_ALLOWED_METHODS.contains( &method )
  {
    return Err( BrokerError::Precondition( "Agent awaiting activation".into() ) );
  }
  if is_screen_locked && !SCREEN_LOCKED_ALLOWED_METHODS.contains( &method )
  {
    return Err( BrokerError::Precondition( "Screen is locked".into() ) );
  }
  Ok( () )
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn blocked_state_denies_everything()
  {
    let err = check( AgentLifecycleState::Blocked, LicenseStatus::Active, false, "ping" ).unwrap_err();
    assert_eq!( err.to_string(), "precondition failed: Agent is blocked" );
  }

  #[ test ]
  fn pending_state_allows_only_the_allowlist()
  {
    assert!( check( AgentLifecycleState::Pending, LicenseStatus::Active, false, "ping" ).is_ok() );
    assert!( check( AgentLifecycleState::Pending, LicenseStatus::Active, false, "shell_exec" ).is_err() );
  }

  #[ test ]
  fn screen_locked_allows_read_only_and_shell()
  {
    assert!( check( AgentLifecycleState::Active, LicenseStatus::Active, true, "fs_read" ).is_ok() );
    assert!( check( AgentLifecycleState::Active, LicenseStatus::Active, true, "mouse_click" ).is_err() );
  }

  #[ test ]
  fn inactive_license_denies_before_state_checks_matter()
  {
    let err = check( AgentLifecycleState::Active, LicenseStatus::Pending, false, "ping" ).unwrap_err();
    assert_eq!( err.to_string(), "precondition failed: License not active" );
  }
}
