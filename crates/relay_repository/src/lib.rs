//! Transactional repository over users, licenses, agents, sessions, command
//! logs, OAuth records, and activity patterns (§3.1, §6).

pub mod error;
pub mod models;
pub mod repository;

pub use error::{ RepositoryError, Result };
pub use repository::{ NewAgentFields, Repository };
