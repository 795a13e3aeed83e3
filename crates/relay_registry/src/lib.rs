//! Live agent registry: the in-memory twin of the `agents` table while a
//! socket is open, plus the license projection and quiet-hours heuristics
//! that only make sense against live connections (§3.2, §4.3).

pub mod activity;
pub mod connected_agent;
pub mod license;
pub mod registry;

pub use activity::detect_quiet_hours;
pub use connected_agent::{ ConnectedAgent, PendingRequest, QueuedCommand, SocketCommand, ToolsCache };
pub use license::project_license_status;
pub use registry::{
  AgentRegistry, FingerprintInfo, HeartbeatConfig, RegisterRequest, RegisteredPayload, StateUpdate,
};
