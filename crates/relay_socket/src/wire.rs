//! §4.5 Agent Socket Protocol: one JSON document per frame, tagged by `type`.

use relay_registry::{ HeartbeatConfig, RegisterRequest, RegisteredPayload, StateUpdate };
use relay_types::LicenseStatus;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Frames an agent sends.
#[ derive( Debug, Deserialize ) ]
#[ serde( tag = "type", rename_all = "snake_case" ) ]
pub enum AgentFrame
{
  Register( RegisterRequest ),
  Response { id: String, result: Value },
  Error { id: String, error: Value },
  Pong { id: Option< String > },
  Heartbeat( StateUpdate ),
  StateChange( StateUpdate ),
}

/// `{heartbeatInterval, powerState?}` pushed on a `state_change` ack.
#[ derive( Debug, Clone, Serialize ) ]
pub struct PowerConfig
{
  pub heartbeat_interval: u64,
  #[ serde( skip_serializing_if = "Option::is_none" ) ]
  pub power_state: Option< relay_types::PowerState >,
}

/// Frames the broker sends.
#[ derive( Debug, Serialize ) ]
#[ serde( tag = "type", rename_all = "snake_case" ) ]
pub enum BrokerFrame
{
  Registered( RegisteredPayload ),
  Request { id: String, method: String, params: Value },
  Config { id: Option< String >, config: PowerConfig },
  HeartbeatAck
  {
    id: Option< String >,
    license_status: LicenseStatus,
    license_changed: bool,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    license_message: Option< String >,
    pending_commands: bool,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    config: Option< HeartbeatConfig >,
  },
  Ping { id: String },
  Error { id: Option< String >, error: Value },
  Update
  {
    has_update: bool,
    #[ serde( skip_serializing_if = "Option::is_none" ) ]
    version: Option< String >,
    is_forced: bool,
  },
}
