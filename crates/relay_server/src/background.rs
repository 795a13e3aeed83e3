//! Background tasks (SPEC_FULL supplemented features 2 & 3): the heartbeat
//! reaper and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_registry::{ AgentRegistry, SocketCommand };
use tokio::sync::broadcast;

const REAPER_INTERVAL: Duration = Duration::from_secs( 5 );
const REAPER_CLOSE_CODE: u16 = 1011;

/// Runs forever, closing any agent socket that has gone quiet for more than
/// `3 * heartbeatInterval` (§5, §4.3.2). Intended to be spawned once at
/// startup and left to run for the server's lifetime.
pub async fn heartbeat_reaper( registry: Arc< AgentRegistry > )
{
  loop
  {
    tokio::time::sleep( REAPER_INTERVAL ).await;

    for agent in registry.connected_agents()
    {
      let power_state = *agent.power_state.lock().unwrap();
      let grace = power_state.heartbeat_interval_secs() as i64 * 3;
      let last_ping = *agent.last_ping.lock().unwrap();

      if ( Utc::now() - last_ping ).num_seconds() > grace
      {
        tracing::warn!( connection = %agent.connection_id, "agent missed heartbeat grace period, closing" );
        let _ = agent.outbound.send( SocketCommand::Close
        {
          code: REAPER_CLOSE_CODE,
          reason: "Heartbeat timeout".into(),
        } ).await;
      }
    }
  }
}

/// Waits for Ctrl-C once, then broadcasts it to every subscriber so both
/// listeners' `with_graceful_shutdown` futures resolve together.
pub async fn broadcast_ctrl_c( tx: broadcast::Sender< () > )
{
  if tokio::signal::ctrl_c().await.is_err()
  {
    tracing::warn!( "failed to install Ctrl-C handler" );
    return;
  }

  tracing::info!( "shutdown signal received" );
  let _ = tx.send( () );
}

/// A listener's graceful-shutdown future: resolves the moment
/// [`broadcast_ctrl_c`] fires.
pub async fn shutdown_signal( mut rx: broadcast::Receiver< () > )
{
  let _ = rx.recv().await;
}
