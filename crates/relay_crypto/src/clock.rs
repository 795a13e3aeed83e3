//! Clock & ID service — monotonic time, UUIDs, cryptographic random.
//!
//! Routed through a trait so tests can inject a fixed clock instead of sleeping on
//! wall time; `SystemClock` is what `relay_server` wires up in production.

use chrono::{ DateTime, Utc };
use uuid::Uuid;

pub trait Clock: Send + Sync + 'static
{
  fn now( &self ) -> DateTime< Utc >;
}

/// Real wall-clock time.
#[ derive( Debug, Clone, Copy, Default ) ]
pub struct SystemClock;

impl Clock for SystemClock
{
  fn now( &self ) -> DateTime< Utc >
  {
    Utc::now()
  }
}

/// A clock that only ever advances when told to — used by timeout/expiry tests.
#[ derive( Debug, Clone ) ]
pub struct FixedClock
{
  now: std::sync::Arc< std::sync::Mutex< DateTime< Utc > > >,
}

impl FixedClock
{
  #[ must_use ]
  pub fn new( start: DateTime< Utc > ) -> Self
  {
    Self { now: std::sync::Arc::new( std::sync::Mutex::new( start ) ) }
  }

  pub fn advance( &self, delta: chrono::Duration )
  {
    let mut guard = self.now.lock().expect( "clock mutex poisoned" );
    *guard += delta;
  }
}

impl Clock for FixedClock
{
  fn now( &self ) -> DateTime< Utc >
  {
    *self.now.lock().expect( "clock mutex poisoned" )
  }
}

/// Generate a fresh v4 UUID. Thin wrapper kept so call sites depend on
/// `relay_crypto` rather than reaching for `uuid` directly — matches the "Clock & ID
/// service" being a single seam per §2.
#[ must_use ]
pub fn new_id() -> Uuid
{
  Uuid::new_v4()
}
