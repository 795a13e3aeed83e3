//! Update-check service: per-channel version cache and rollout bucketing (§4.9).

pub mod cache;
pub mod service;
pub mod version;

pub use cache::{ ChannelRelease, VersionCache };
pub use service::{ check_update_available, UpdateCheckResult };
pub use version::{ compare_versions, hash_code, in_rollout_bucket };
