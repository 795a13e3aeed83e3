//! §4.9 `checkUpdateAvailable`.

use std::cmp::Ordering;

use relay_repository::Repository;

use crate::cache::VersionCache;
use crate::version::{ compare_versions, in_rollout_bucket };

#[ derive( Debug, Clone, PartialEq, Eq ) ]
pub struct UpdateCheckResult
{
  pub has_update: bool,
  pub version: Option< String >,
  pub is_forced: bool,
}

impl UpdateCheckResult
{
  fn none() -> Self
  {
    Self { has_update: false, version: None, is_forced: false }
  }
}

/// # Errors
/// Propagates repository failures from the backing [`VersionCache`] refresh.
pub async fn check_update_available(
  cache: &VersionCache,
  repository: &Repository,
  agent_version: &str,
  platform_arch: &str,
  machine_id: Option< &str >,
  channel: &str,
) -> relay_repository::Result< UpdateCheckResult >
{
  let Some( release ) = cache.get( repository, channel ).await? else
  {
    return Ok( UpdateCheckResult::none() );
  };

  if !release.builds.contains( platform_arch )
  {
    return Ok( UpdateCheckResult::none() );
  }

  if compare_versions( agent_version, &release.version ) != Ordering::Less
  {
    return Ok( UpdateCheckResult::none() );
  }

  let is_forced = release.min_version.as_deref()
    .is_some_and( |min_version| compare_versions( agent_version, min_version ) == Ordering::Less );

  if !is_forced && release.rollout_percent < 100
  {
    let Some( machine_id ) = machine_id else { return Ok( UpdateCheckResult::none() ) };
    if !in_rollout_bucket( machine_id, release.rollout_percent )
    {
      return Ok( UpdateCheckResult::none() );
    }
  }

  Ok( UpdateCheckResult { has_update: true, version: Some( release.version ), is_forced } )
}
