//! Binary crate support modules: configuration, state/router composition,
//! and the background tasks `main` spawns alongside `axum::serve`.

pub mod app;
pub mod background;
pub mod config;
pub mod error;

pub use app::AppState;
pub use config::Config;
