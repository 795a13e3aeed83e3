//! Foundation types shared across the broker workspace: entity identifiers, the
//! enumerations that back the data model (§3), the OAuth scope model (§4.2), and the
//! error taxonomy (§7).

pub mod ids;
pub mod enums;
pub mod scope;
pub mod error;

pub use ids::{
  AgentId, AgentSessionId, AiConnectionId, CommandLogId, ConnectionId, IdError,
  LicenseId, McpConnectionId, OAuthClientId, TerminalSessionId, UserId,
};
pub use enums::{
  AccountStatus, AgentConnectionStatus, AgentLifecycleState, CommandStatus,
  LicenseRowStatus, LicenseStatus, McpConnectionStatus, OsType, PowerState, ReleaseChannel,
};
pub use scope::{ format_scope_list, parse_scope_list, required_scope_for_method, Scope };
pub use error::{ BrokerError, JsonRpcErrorBody };
