//! Terminal session manager: one-shot viewer tokens and the agent-relayed
//! polling loop that streams `terminal_output` to a viewer (§4.10).

pub mod manager;
pub mod token;

pub use manager::TerminalManager;
pub use token::{ SessionTokenClaim, TokenStore };
