//! §4.9 per-channel version cache, 60s TTL.

use std::collections::{ HashMap, HashSet };
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use relay_repository::Repository;

const CACHE_TTL: Duration = Duration::from_secs( 60 );

#[ derive( Debug, Clone ) ]
pub struct ChannelRelease
{
  pub version: String,
  pub min_version: Option< String >,
  pub rollout_percent: i64,
  pub builds: HashSet< String >,
}

struct CachedEntry
{
  release: ChannelRelease,
  fetched_at: Instant,
}

/// Holds one `ChannelRelease` per release channel, refreshed from the
/// repository at most once per `ttl`.
pub struct VersionCache
{
  entries: Mutex< HashMap< String, CachedEntry > >,
  ttl: Duration,
}

impl VersionCache
{
  #[ must_use ]
  pub fn new() -> Self
  {
    Self::with_ttl( CACHE_TTL )
  }

  #[ must_use ]
  pub fn with_ttl( ttl: Duration ) -> Self
  {
    Self { entries: Mutex::new( HashMap::new() ), ttl }
  }

  /// Returns the cached release for `channel`, refreshing from `repository`
  /// if the entry is missing or stale. Returns `None` if the channel has no
  /// configured version row.
  ///
  /// # Errors
  /// Propagates repository failures encountered while refreshing.
  pub async fn get( &self, repository: &Repository, channel: &str ) -> relay_repository::Result< Option< ChannelRelease > >
  {
    if let Some( cached ) = self.cached_if_fresh( channel )
    {
      return Ok( Some( cached ) );
    }

    let Some( version_row ) = repository.get_agent_version( channel ).await? else
    {
      return Ok( None );
    };
    let build_rows = repository.list_agent_builds( channel ).await?;

    let release = ChannelRelease
    {
      version: version_row.version,
      min_version: version_row.min_version,
      rollout_percent: version_row.rollout_percent,
      builds: build_rows.into_iter().map( |row| row.platform_arch ).collect(),
    };

    self.entries.lock().unwrap().insert(
      channel.to_string(),
      CachedEntry { release: release.clone(), fetched_at: Instant::now() },
    );

    Ok( Some( release ) )
  }

  fn cached_if_fresh( &self, channel: &str ) -> Option< ChannelRelease >
  {
    let entries = self.entries.lock().unwrap();
    let entry = entries.get( channel )?;
    if entry.fetched_at.elapsed() < self.ttl
    {
      Some( entry.release.clone() )
    }
    else
    {
      None
    }
  }
}

impl Default for VersionCache
{
  fn default() -> Self
  {
    Self::new()
  }
}
