//! Enumerations shared across the registry, router, repository, and wire layers.

use serde::{ Deserialize, Serialize };

/// §3.1 User.accountStatus
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum AccountStatus
{
  Active,
  Suspended,
}

/// §3.1 License.status
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum LicenseRowStatus
{
  Active,
  Expired,
  Suspended,
}

/// §3.1 Agent.osType, derived from the free-form string an agent reports at register
/// time (§4.3 step 2).
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum OsType
{
  Windows,
  Macos,
  Linux,
}

impl OsType
{
  /// Classify a free-form OS description the way agents self-report it.
  ///
  /// "windows"/"win32" -> WINDOWS; "linux" -> LINUX; anything else -> MACOS.
  #[ must_use ]
  pub fn classify( raw: &str ) -> Self
  {
    let lower = raw.to_lowercase();
    if lower.contains( "windows" ) || lower.contains( "win32" )
    {
      Self::Windows
    }
    else if lower.contains( "linux" )
    {
      Self::Linux
    }
    else
    {
      Self::Macos
    }
  }
}

/// §3.1 Agent.state
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum AgentLifecycleState
{
  Pending,
  Active,
  Blocked,
  Expired,
}

/// §3.1 Agent.powerState / §4.3.2 heartbeat cadence.
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum PowerState
{
  Active,
  Passive,
  Sleep,
}

impl PowerState
{
  /// §4.3.2 heartbeat interval table.
  #[ must_use ]
  pub fn heartbeat_interval_secs( self ) -> u64
  {
    match self
    {
      Self::Active => 5,
      Self::Passive => 30,
      Self::Sleep => 300,
    }
  }
}

/// §3.1 Agent.status
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum AgentConnectionStatus
{
  Online,
  Offline,
}

/// §4.3.1 projected license status — the thing the router's precondition check reads.
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "lowercase" ) ]
pub enum LicenseStatus
{
  Active,
  Pending,
  Expired,
  Blocked,
}

/// §3.1 CommandLog.status
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum CommandStatus
{
  Sent,
  Completed,
  Failed,
  Timeout,
}

/// §3.1 McpConnection.status
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum McpConnectionStatus
{
  Active,
  Revoked,
}

/// §4.9 update-check release channels.
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
#[ serde( rename_all = "UPPERCASE" ) ]
pub enum ReleaseChannel
{
  Stable,
  Beta,
  Dev,
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn classifies_os_from_free_form_text()
  {
    assert_eq!( OsType::classify( "Windows 11 Pro" ), OsType::Windows );
    assert_eq!( OsType::classify( "win32 host" ), OsType::Windows );
    assert_eq!( OsType::classify( "Ubuntu Linux 22.04" ), OsType::Linux );
    assert_eq!( OsType::classify( "macOS Sonoma" ), OsType::Macos );
    assert_eq!( OsType::classify( "anything else" ), OsType::Macos );
  }

  #[ test ]
  fn heartbeat_intervals_match_the_table()
  {
    assert_eq!( PowerState::Active.heartbeat_interval_secs(), 5 );
    assert_eq!( PowerState::Passive.heartbeat_interval_secs(), 30 );
    assert_eq!( PowerState::Sleep.heartbeat_interval_secs(), 300 );
  }
}
