//! Process entry point: load configuration, stand up the repository and
//! in-memory registry, compose the tenant and agent routers, and serve both
//! alongside the heartbeat reaper until shutdown.

use std::sync::Arc;

use relay_registry::AgentRegistry;
use relay_repository::Repository;
use relay_server::{ app, background, Config };
use tracing_subscriber::EnvFilter;

#[ tokio::main ]
async fn main() -> Result< (), Box< dyn std::error::Error > >
{
  tracing_subscriber::fmt()
    .with_env_filter( EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "info" ) ) )
    .init();

  let config = Config::load().unwrap_or_else( |err |
  {
    tracing::warn!( error = %err, "no config file found, falling back to development defaults" );
    Config::default_dev()
  } );

  let repository = Repository::new( &config.database.url ).await?;
  let registry = Arc::new( AgentRegistry::new( repository.clone() ) );
  let state = app::AppState::new( repository, registry.clone(), &config );

  let tenant_router = app::tenant_router( &config, &state );
  let agent_router = app::agent_router( &state )
    .into_make_service_with_connect_info::< std::net::SocketAddr >();

  let tenant_listener = tokio::net::TcpListener::bind( config.tenant_http.socket_addr() ).await?;
  let agent_listener = tokio::net::TcpListener::bind( config.agent_socket.socket_addr() ).await?;

  tracing::info!( addr = %config.tenant_http.socket_addr(), "tenant endpoint listening" );
  tracing::info!( addr = %config.agent_socket.socket_addr(), "agent socket listening" );

  tokio::spawn( background::heartbeat_reaper( registry.clone() ) );

  let ( shutdown_tx, _ ) = tokio::sync::broadcast::channel::< () >( 1 );
  tokio::spawn( background::broadcast_ctrl_c( shutdown_tx.clone() ) );

  let tenant_shutdown = shutdown_tx.subscribe();
  let tenant_server = tokio::spawn( async move
  {
    axum::serve( tenant_listener, tenant_router )
      .with_graceful_shutdown( background::shutdown_signal( tenant_shutdown ) )
      .await
  } );

  let agent_shutdown = shutdown_tx.subscribe();
  let agent_server = tokio::spawn( async move
  {
    axum::serve( agent_listener, agent_router )
      .with_graceful_shutdown( background::shutdown_signal( agent_shutdown ) )
      .await
  } );

  let ( tenant_result, agent_result ) = tokio::try_join!( tenant_server, agent_server )?;
  tenant_result?;
  agent_result?;

  registry.cleanup().await;
  Ok( () )
}
