//! Fixed-window rate limiting keyed by IP or connection id (§4.8).
//!
//! One counter per key that resets wholesale once its window elapses, rather
//! than evicting individual timestamps from a sliding window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{ Duration, Instant };

struct Window
{
  started_at: Instant,
  count: u32,
}

/// One fixed-window counter per key. `limit` and `window` are supplied per
/// check so the same limiter type backs both the unauthenticated (by IP) and
/// authenticated (by connection id) policies (§4.8).
pub struct FixedWindowLimiter
{
  windows: Mutex< HashMap< String, Window > >,
}

/// Outcome of an exceeded check: seconds until the window resets and the
/// current remaining-request count (always 0 when rate limited).
#[ derive( Debug, Clone, Copy ) ]
pub struct RateLimited
{
  pub retry_after_secs: u64,
}

impl FixedWindowLimiter
{
  #[ must_use ]
  pub fn new() -> Self
  {
    Self { windows: Mutex::new( HashMap::new() ) }
  }

  /// Increment `key`'s counter, starting a fresh window if the prior one has
  /// elapsed. Returns `Err` with the seconds remaining in the current window
  /// once `limit` requests have already been recorded in it.
  pub fn check( &self, key: &str, limit: u32, window: Duration ) -> Result< (), RateLimited >
  {
    let now = Instant::now();
    let mut windows = self.windows.lock().unwrap();
    let entry = windows.entry( key.to_string() ).or_insert_with( || Window { started_at: now, count: 0 } );

    if now.duration_since( entry.started_at ) >= window
    {
      entry.started_at = now;
      entry.count = 0;
    }

    if entry.count >= limit
    {
      let retry_after = window.saturating_sub( now.duration_since( entry.started_at ) ).as_secs().max( 1 );
      return Err( RateLimited { retry_after_secs: retry_after } );
    }

    entry.count += 1;
    Ok( () )
  }
}

impl Default for FixedWindowLimiter
{
  fn default() -> Self
  {
    Self::new()
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn allows_requests_up_to_the_limit()
  {
    let limiter = FixedWindowLimiter::new();
    for _ in 0..5
    {
      assert!( limiter.check( "1.2.3.4", 5, Duration::from_secs( 60 ) ).is_ok() );
    }
    assert!( limiter.check( "1.2.3.4", 5, Duration::from_secs( 60 ) ).is_err() );
  }

  #[ test ]
  fn counters_are_independent_per_key()
  {
    let limiter = FixedWindowLimiter::new();
    for _ in 0..5
    {
      limiter.check( "a", 5, Duration::from_secs( 60 ) ).unwrap();
    }
    assert!( limiter.check( "b", 5, Duration::from_secs( 60 ) ).is_ok() );
  }
}
