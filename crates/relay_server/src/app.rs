//! Top-level router composition: nests the OAuth, tenant MCP, and agent
//! socket routers under one `axum::Router`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use relay_registry::AgentRegistry;
use relay_repository::Repository;
use relay_socket::SocketState;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Everything a freshly-started process needs, handed out to whichever
/// router or background task wants it.
#[ derive( Clone ) ]
pub struct AppState
{
  pub repository: Repository,
  pub registry: Arc< AgentRegistry >,
  pub version_cache: Arc< relay_update::VersionCache >,
  pub terminal_manager: Arc< relay_terminal::TerminalManager >,
}

impl AppState
{
  #[ must_use ]
  pub fn new( repository: Repository, registry: Arc< AgentRegistry >, config: &Config ) -> Self
  {
    let terminal_manager = Arc::new( relay_terminal::TerminalManager::new( registry.clone(), repository.clone() ) );
    let version_cache = relay_update::VersionCache::with_ttl( Duration::from_secs( config.update_check.cache_ttl_secs ) );
    Self
    {
      repository,
      registry,
      version_cache: Arc::new( version_cache ),
      terminal_manager,
    }
  }
}

fn cors_layer() -> CorsLayer
{
  CorsLayer::new()
    .allow_origin( Any )
    .allow_methods( Any )
    .allow_headers( Any )
    .max_age( Duration::from_secs( 86_400 ) )
}

/// Builds the tenant-facing router: OAuth authorization server (§4.6) nested
/// alongside the `/mcp/{uuid}` endpoint (§4.7), shared CORS policy.
#[ must_use ]
pub fn tenant_router( config: &Config, state: &AppState ) -> Router
{
  let oauth_state = relay_oauth::OAuthState
  {
    repository: state.repository.clone(),
    config: relay_oauth::OAuthConfig
    {
      app_url: config.app_url.clone(),
      dev_session_enabled: config.oauth.dev_session_enabled,
      session_signing_key: config.oauth.session_signing_key.clone(),
    },
  };

  let http_state = relay_http::state::HttpState::new( state.repository.clone(), state.registry.clone(), config.app_url.clone() );

  Router::new()
    .merge( relay_oauth::router( oauth_state ) )
    .merge( relay_http::router( http_state ) )
    .layer( cors_layer() )
    .layer( TraceLayer::new_for_http() )
}

/// Builds the agent-facing router: the single WebSocket upgrade endpoint
/// agents dial into (§3.2, §4.5). `agent_ws_handler` extracts
/// `ConnectInfo<SocketAddr>`, so `main` must serve this with
/// `into_make_service_with_connect_info` rather than the plain `Router`
/// service.
#[ must_use ]
pub fn agent_router( state: &AppState ) -> Router
{
  let socket_state = SocketState
  {
    registry: state.registry.clone(),
    repository: state.repository.clone(),
    version_cache: state.version_cache.clone(),
  };

  Router::new()
    .route( "/agent", axum::routing::get( relay_socket::agent_ws_handler ) )
    .layer( TraceLayer::new_for_http() )
    .with_state( socket_state )
}
