//! Shared state for the tenant endpoint router (§4.7).

use std::sync::Arc;

use relay_registry::AgentRegistry;
use relay_repository::Repository;

use crate::rate_limit::FixedWindowLimiter;

/// Requests/minute allowed per unauthenticated IP before a 429 (§4.8).
pub const IP_RATE_LIMIT: u32 = 30;
/// Requests/minute allowed per authenticated connection before a 429 (§4.8).
pub const CONNECTION_RATE_LIMIT: u32 = 100;

#[ derive( Clone ) ]
pub struct HttpState
{
  pub repository: Repository,
  pub registry: Arc< AgentRegistry >,
  pub app_url: String,
  pub ip_limiter: Arc< FixedWindowLimiter >,
  pub connection_limiter: Arc< FixedWindowLimiter >,
}

impl HttpState
{
  #[ must_use ]
  pub fn new( repository: Repository, registry: Arc< AgentRegistry >, app_url: String ) -> Self
  {
    Self
    {
      repository,
      registry,
      app_url,
      ip_limiter: Arc::new( FixedWindowLimiter::new() ),
      connection_limiter: Arc::new( FixedWindowLimiter::new() ),
    }
  }
}
