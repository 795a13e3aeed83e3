//! Agent Socket Protocol (§4.5): wire frames plus the axum WebSocket upgrade
//! and reader/writer task split that carries them.

pub mod handler;
pub mod wire;

pub use handler::{ agent_ws_handler, SocketState };
pub use wire::{ AgentFrame, BrokerFrame, PowerConfig };
