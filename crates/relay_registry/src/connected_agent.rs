//! `ConnectedAgent` — the in-memory live-socket record (§3.2).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{ DateTime, Utc };
use relay_types::{ AgentConnectionStatus, ConnectionId, LicenseStatus, OsType, PowerState };
use serde_json::Value;
use tokio::sync::{ mpsc, oneshot };

/// Outbound traffic for an agent socket. The registry never touches the raw
/// WebSocket — it hands frames to whoever owns the writer half of this
/// channel (the agent socket's writer task, in `relay_socket`). Mirrors the
/// reader/writer split called out for the agent-side protocol.
#[ derive( Debug ) ]
pub enum SocketCommand
{
  Send( Value ),
  Close { code: u16, reason: String },
}

/// A single outstanding `sendCommand` awaiting the agent's `response`.
pub struct PendingRequest
{
  pub resolver: oneshot::Sender< Result< Value, String > >,
  pub command_log_id: String,
  pub started_at: DateTime< Utc >,
  /// Cancels the 30s timeout task once the response arrives.
  pub timeout_handle: tokio::task::AbortHandle,
}

/// A tool invocation queued while the agent was asleep (§4.4 `sendCommand`).
/// The caller's `sendCommand` await resolves once [`crate::registry::AgentRegistry::process_queued_commands`]
/// dispatches it and the agent responds.
pub struct QueuedCommand
{
  pub method: String,
  pub params: Value,
  pub enqueued_at: DateTime< Utc >,
  pub resolver: oneshot::Sender< Result< Value, String > >,
}

/// Cached capability catalog for `tools/list` aggregation (§4.4).
#[ derive( Debug, Clone ) ]
pub struct ToolsCache
{
  pub tools: Vec< Value >,
  pub fetched_at: DateTime< Utc >,
}

pub struct ConnectedAgent
{
  pub connection_id: ConnectionId,
  pub db_id: String,
  pub owner_user_id: String,
  pub outbound: mpsc::Sender< SocketCommand >,
  pub remote_address: String,
  pub is_internal: bool,
  pub customer_id: Option< String >,
  pub license_uuid: Option< String >,
  pub license_status: Mutex< LicenseStatus >,
  pub machine_id: Option< String >,
  pub hostname: Option< String >,
  pub display_name: Option< String >,
  pub os_type: OsType,
  pub os_version: Option< String >,
  pub arch: Option< String >,
  pub agent_version: Option< String >,
  pub fingerprint: Option< String >,
  pub state: Mutex< relay_types::AgentLifecycleState >,
  pub power_state: Mutex< PowerState >,
  pub is_screen_locked: Mutex< bool >,
  pub current_task: Mutex< Option< String > >,
  pub connected_at: DateTime< Utc >,
  pub last_ping: Mutex< DateTime< Utc > >,
  pub last_activity: Mutex< DateTime< Utc > >,
  pub tools: Mutex< Option< ToolsCache > >,
  pub pending_requests: Mutex< HashMap< String, PendingRequest > >,
  pub queued_commands: Mutex< Vec< QueuedCommand > >,
  pub session_id: Mutex< Option< String > >,
  pub connection_status: Mutex< AgentConnectionStatus >,
}

impl ConnectedAgent
{
  /// `displayName || hostname || "Unnamed Agent"` (§4.4 fuzzy selection).
  #[ must_use ]
  pub fn resolved_name( &self ) -> String
  {
    self.display_name.clone()
      .or_else( || self.hostname.clone() )
      .unwrap_or_else( || "Unnamed Agent".to_string() )
  }
}
