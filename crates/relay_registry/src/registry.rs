//! `AgentRegistry` — the live-connection index and §4.3 operation set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use relay_repository::{ NewAgentFields, Repository };
use relay_types::{ AgentConnectionStatus, AgentLifecycleState, BrokerError, ConnectionId, OsType, PowerState };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connected_agent::{ ConnectedAgent, QueuedCommand, SocketCommand };
use crate::license::project_license_status;

/// Default grace period advertised in `registered.config` (§4.3 step 6).
const GRACE_HOURS: i64 = 72;

/// The `fingerprint` sub-object an agent sends with `register` (§3.2).
#[ derive( Debug, Clone, Default, Deserialize ) ]
pub struct FingerprintInfo
{
  pub cpu_model: Option< String >,
  pub disk_serial: Option< String >,
  pub motherboard_uuid: Option< String >,
  #[ serde( default ) ]
  pub mac_addresses: Vec< String >,
}

impl FingerprintInfo
{
  /// `SHA256(join('|', cpuModel, diskSerial, motherboardUuid, sort(macAddresses)))`
  /// (§4.3 step 3).
  #[ must_use ]
  pub fn compute( &self ) -> String
  {
    let mut macs = self.mac_addresses.clone();
    macs.sort();
    let joined = [
      self.cpu_model.clone().unwrap_or_default(),
      self.disk_serial.clone().unwrap_or_default(),
      self.motherboard_uuid.clone().unwrap_or_default(),
      macs.join( "," ),
    ]
    .join( "|" );
    relay_crypto::hash_token( &joined )
  }
}

/// The payload an agent sends on `{type:"register"}` (§3.2 + §4.5).
#[ derive( Debug, Clone, Deserialize ) ]
pub struct RegisterRequest
{
  pub machine_id: String,
  pub customer_id: Option< String >,
  pub hostname: Option< String >,
  pub display_name: Option< String >,
  pub os_type: String,
  pub os_version: Option< String >,
  pub arch: Option< String >,
  pub agent_version: Option< String >,
  #[ serde( default ) ]
  pub fingerprint: FingerprintInfo,
}

/// `{heartbeatInterval, graceHours}` advertised in `registered`/`config` frames.
#[ derive( Debug, Clone, Serialize ) ]
pub struct HeartbeatConfig
{
  pub heartbeat_interval: u64,
  pub grace_hours: i64,
}

/// The `registered` message body (§4.3 step 6).
#[ derive( Debug, Clone, Serialize ) ]
pub struct RegisteredPayload
{
  pub id: String,
  pub agent_id: String,
  pub license_status: relay_types::LicenseStatus,
  pub license_uuid: Option< String >,
  pub state: AgentLifecycleState,
  pub power_state: PowerState,
  pub config: HeartbeatConfig,
}

/// Fields accepted by `updateState` (§4.3 `updateState`).
#[ derive( Debug, Clone, Default, Deserialize ) ]
pub struct StateUpdate
{
  pub power_state: Option< PowerState >,
  pub is_screen_locked: Option< bool >,
  pub current_task: Option< String >,
}

pub struct AgentRegistry
{
  repository: Repository,
  by_connection: DashMap< ConnectionId, Arc< ConnectedAgent > >,
  by_machine: DashMap< String, ConnectionId >,
  by_db_id: DashMap< String, ConnectionId >,
}

impl AgentRegistry
{
  #[ must_use ]
  pub fn new( repository: Repository ) -> Self
  {
    Self
    {
      repository,
      by_connection: DashMap::new(),
      by_machine: DashMap::new(),
      by_db_id: DashMap::new(),
    }
  }

  #[ must_use ]
  pub fn repository( &self ) -> &Repository
  {
    &self.repository
  }

  fn machine_key( customer_id: Option< &str >, machine_id: &str ) -> String
  {
    format!( "{}:{machine_id}", customer_id.unwrap_or( "" ) )
  }

  /// §4.3 `register`.
  ///
  /// # Errors
  /// Returns [`BrokerError::Protocol`] when `machineId` is missing and
  /// [`BrokerError::Internal`] on repository failures.
  pub async fn register(
    &self,
    outbound: mpsc::Sender< SocketCommand >,
    remote_address: String,
    msg: RegisterRequest,
  ) -> Result< Arc< ConnectedAgent >, BrokerError >
  {
    if msg.machine_id.trim().is_empty()
    {
      return Err( BrokerError::Protocol( "register: missing machineId".into() ) );
    }

    let machine_key = Self::machine_key( msg.customer_id.as_deref(), &msg.machine_id );

    // Step 1: displace a stale connection from the same machine. The sender is
    // cloned out and the map entry dropped before awaiting, since holding a
    // `DashMap` shard guard across an `.await` would deadlock against the
    // `remove` inside `unregister` below.
    if let Some( ( _, existing_connection_id ) ) = self.by_machine.remove( &machine_key )
    {
      let existing_outbound = self.by_connection.get( &existing_connection_id ).map( |a| a.outbound.clone() );
      if let Some( sender ) = existing_outbound
      {
        let _ = sender.send( SocketCommand::Close
        {
          code: 1000,
          reason: "New connection from same machine".into(),
        } ).await;
      }
      self.unregister( existing_connection_id ).await?;
    }

    // Step 2: classify osType from free-form text.
    let os_type = OsType::classify( &msg.os_type );

    // Step 3: repository upsert, materializing a system user + trial license on create.
    let existing_agent = self.repository
      .find_agent_by_machine( msg.customer_id.as_deref(), &msg.machine_id )
      .await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let ( owner_user_id, license_id ) = match &existing_agent
    {
      Some( row ) => ( row.owner_user_id.clone(), row.license_id.clone() ),
      None =>
      {
        let system_email = format!( "agent+{}@system.local", msg.machine_id );
        let user = self.repository.ensure_user_by_email( &system_email ).await
          .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
        let license = self.repository.create_trial_license( &user.id ).await
          .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
        ( user.id, license.id )
      }
    };

    let fields = NewAgentFields
    {
      machine_fingerprint: None,
      fingerprint_raw: None,
      hostname: msg.hostname.clone(),
      display_name: msg.display_name.clone(),
      os_type: format!( "{os_type:?}" ).to_uppercase(),
      os_version: msg.os_version.clone(),
      arch: msg.arch.clone(),
      agent_version: msg.agent_version.clone(),
      ip_address: Some( remote_address.clone() ),
    };

    let ( mut agent_row, _was_new ) = self.repository
      .upsert_agent( msg.customer_id.as_deref(), &msg.machine_id, &owner_user_id, &license_id, &fields )
      .await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let new_fingerprint = msg.fingerprint.compute();
    if agent_row.machine_fingerprint.as_deref() != Some( new_fingerprint.as_str() )
    {
      let previous = agent_row.machine_fingerprint.clone();
      self.repository.set_agent_fingerprint( &agent_row.id, &new_fingerprint, "{}" ).await
        .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
      self.repository.log_fingerprint_change(
        &agent_row.id,
        "MACHINE_FINGERPRINT",
        previous.as_deref(),
        Some( new_fingerprint.as_str() ),
        if previous.is_none() { "RECORDED" } else { "UPDATED" },
        None,
      ).await.map_err( |e| BrokerError::Internal( e.to_string() ) )?;
      agent_row.machine_fingerprint = Some( new_fingerprint );
    }

    // Step 4: project licenseStatus.
    let license = self.repository.get_license( &license_id ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
    let state: AgentLifecycleState = parse_state( &agent_row.state );
    let license_status = project_license_status( state, &license, Utc::now() );

    // Step 5: open a session for this connection.
    let session_id = self.repository.open_agent_session( &agent_row.id, &remote_address ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let connection_id = ConnectionId::generate();
    let power_state = parse_power_state( &agent_row.power_state );

    let agent = Arc::new( ConnectedAgent
    {
      connection_id: connection_id.clone(),
      db_id: agent_row.id.clone(),
      owner_user_id: owner_user_id.clone(),
      outbound,
      remote_address,
      is_internal: false,
      customer_id: msg.customer_id.clone(),
      license_uuid: agent_row.license_uuid.clone(),
      license_status: std::sync::Mutex::new( license_status ),
      machine_id: Some( msg.machine_id.clone() ),
      hostname: msg.hostname,
      display_name: msg.display_name,
      os_type,
      os_version: msg.os_version,
      arch: msg.arch,
      agent_version: msg.agent_version,
      fingerprint: agent_row.machine_fingerprint.clone(),
      state: std::sync::Mutex::new( state ),
      power_state: std::sync::Mutex::new( power_state ),
      is_screen_locked: std::sync::Mutex::new( agent_row.is_screen_locked ),
      current_task: std::sync::Mutex::new( agent_row.current_task.clone() ),
      connected_at: Utc::now(),
      last_ping: std::sync::Mutex::new( Utc::now() ),
      last_activity: std::sync::Mutex::new( Utc::now() ),
      tools: std::sync::Mutex::new( None ),
      pending_requests: std::sync::Mutex::new( HashMap::new() ),
      queued_commands: std::sync::Mutex::new( Vec::new() ),
      session_id: std::sync::Mutex::new( Some( session_id ) ),
      connection_status: std::sync::Mutex::new( AgentConnectionStatus::Online ),
    } );

    self.by_connection.insert( connection_id.clone(), agent.clone() );
    self.by_machine.insert( machine_key, connection_id );
    self.by_db_id.insert( agent_row.id, connection_id.clone() );

    Ok( agent )
  }

  /// Build the `registered` wire payload for an agent just returned by
  /// [`Self::register`] (kept separate so callers can log/send independently).
  #[ must_use ]
  pub fn registered_payload( agent: &ConnectedAgent ) -> RegisteredPayload
  {
    let state = *agent.state.lock().unwrap();
    let power_state = *agent.power_state.lock().unwrap();
    let license_status = *agent.license_status.lock().unwrap();

    RegisteredPayload
    {
      id: agent.connection_id.to_string(),
      agent_id: agent.db_id.clone(),
      license_status,
      license_uuid: agent.license_uuid.clone(),
      state,
      power_state,
      config: HeartbeatConfig
      {
        heartbeat_interval: power_state.heartbeat_interval_secs(),
        grace_hours: GRACE_HOURS,
      },
    }
  }

  /// §4.3 `unregister`.
  ///
  /// # Errors
  /// Returns [`BrokerError::Internal`] on repository failures.
  pub async fn unregister( &self, connection_id: ConnectionId ) -> Result< (), BrokerError >
  {
    let Some( ( _, agent ) ) = self.by_connection.remove( &connection_id ) else { return Ok( () ) };

    if let Some( machine_id ) = &agent.machine_id
    {
      self.by_machine.remove( &Self::machine_key( agent.customer_id.as_deref(), machine_id ) );
    }
    self.by_db_id.remove( &agent.db_id );

    reject_all_pending( &agent, "Agent disconnected" );

    self.repository.mark_agent_offline( &agent.db_id ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let session_id = agent.session_id.lock().unwrap().take();
    if let Some( session_id ) = session_id
    {
      self.repository.close_agent_session( &session_id ).await
        .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
    }

    Ok( () )
  }

  /// §4.3 `getAgent` — accepts a connection id or a database id.
  #[ must_use ]
  pub fn get_agent( &self, id: &str ) -> Option< Arc< ConnectedAgent > >
  {
    if let Ok( connection_id ) = id.parse::< ConnectionId >()
    {
      if let Some( agent ) = self.by_connection.get( &connection_id )
      {
        return Some( agent.clone() );
      }
    }
    let connection_id = self.by_db_id.get( id )?;
    self.by_connection.get( &*connection_id ).map( |a| a.clone() )
  }

  /// §4.3 `updatePing`.
  pub fn update_ping( &self, agent: &ConnectedAgent )
  {
    *agent.last_ping.lock().unwrap() = Utc::now();
  }

  /// §4.3 `updateState` / §4.3.2 heartbeat scheduling.
  ///
  /// Returns `true` when the power state transitioned out of `SLEEP`, the
  /// signal callers use to trigger [`Self::process_queued_commands`]. The
  /// comparison happens *before* the in-memory field is overwritten so the
  /// SLEEP→{ACTIVE,PASSIVE} edge is never missed.
  ///
  /// # Errors
  /// Returns [`BrokerError::Internal`] on repository failures.
  pub async fn update_state( &self, agent: &ConnectedAgent, update: StateUpdate ) -> Result< bool, BrokerError >
  {
    let was_asleep =
    {
      let current = agent.power_state.lock().unwrap();
      *current == PowerState::Sleep
    };

    if let Some( power_state ) = update.power_state
    {
      *agent.power_state.lock().unwrap() = power_state;
    }
    if let Some( locked ) = update.is_screen_locked
    {
      *agent.is_screen_locked.lock().unwrap() = locked;
    }
    if update.current_task.is_some()
    {
      *agent.current_task.lock().unwrap() = update.current_task.clone();
    }
    *agent.last_activity.lock().unwrap() = Utc::now();

    let power_state_str = update.power_state.map( |p| format!( "{p:?}" ).to_uppercase() );
    self.repository.update_agent_heartbeat(
      &agent.db_id,
      power_state_str.as_deref(),
      update.is_screen_locked,
      update.current_task.as_deref(),
    ).await.map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let woke_up = was_asleep && update.power_state.is_some_and( |p| p != PowerState::Sleep );
    Ok( woke_up )
  }

  /// §4.3 `handleResponse` — resolves the matching `PendingRequest`, clears its
  /// timeout, and transitions the `CommandLog` row to `COMPLETED`/`FAILED`.
  /// A response with no matching pending request (already timed out, or a
  /// stray frame) is silently ignored.
  ///
  /// # Errors
  /// Returns [`BrokerError::Internal`] on repository failures.
  pub async fn handle_response(
    &self,
    agent: &ConnectedAgent,
    request_id: &str,
    outcome: Result< Value, String >,
  ) -> Result< (), BrokerError >
  {
    let pending = agent.pending_requests.lock().unwrap().remove( request_id );
    let Some( pending ) = pending else { return Ok( () ) };
    pending.timeout_handle.abort();

    let ( status, result_json, error_message ): ( &str, Option< String >, Option< &str > ) = match &outcome
    {
      Ok( value ) => ( "COMPLETED", Some( value.to_string() ), None ),
      Err( reason ) => ( "FAILED", None, Some( reason.as_str() ) ),
    };

    self.repository.complete_command( &pending.command_log_id, status, result_json.as_deref(), error_message ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let _ = pending.resolver.send( outcome );
    Ok( () )
  }

  /// §4.3.1 `checkLicenseStatus` — a fast read-only re-projection run on every
  /// heartbeat. Returns the current status and whether it just changed. A
  /// downgrade out of `active` is persisted onto the agent's `state`.
  ///
  /// # Errors
  /// Returns [`BrokerError::Internal`] on repository failures.
  pub async fn check_license_status( &self, agent: &ConnectedAgent ) -> Result< ( relay_types::LicenseStatus, bool ), BrokerError >
  {
    let row = self.repository.get_agent( &agent.db_id ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
    let license = self.repository.get_license( &row.license_id ).await
      .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

    let state = parse_state( &row.state );
    let new_status = project_license_status( state, &license, Utc::now() );

    let previous_status = *agent.license_status.lock().unwrap();
    let changed = previous_status != new_status;
    *agent.license_status.lock().unwrap() = new_status;

    if changed && new_status != relay_types::LicenseStatus::Active
    {
      let new_state = match new_status
      {
        relay_types::LicenseStatus::Expired => AgentLifecycleState::Expired,
        relay_types::LicenseStatus::Blocked => AgentLifecycleState::Blocked,
        _ => state,
      };
      if new_state != state
      {
        self.repository.set_agent_state( &agent.db_id, &format!( "{new_state:?}" ).to_uppercase() ).await
          .map_err( |e| BrokerError::Internal( e.to_string() ) )?;
        *agent.state.lock().unwrap() = new_state;
      }
    }

    Ok( ( new_status, changed ) )
  }

  /// §4.3 `hasPendingQueuedCommands`.
  #[ must_use ]
  pub fn has_pending_queued_commands( &self, connection_id: &ConnectionId ) -> bool
  {
    self.by_connection.get( connection_id )
      .is_some_and( |a| !a.queued_commands.lock().unwrap().is_empty() )
  }

  /// §4.3 `processQueuedCommands` — FIFO drain, returned to the caller (the
  /// router) for dispatch since `sendCommand` itself lives in `relay_router`.
  #[ must_use ]
  pub fn process_queued_commands( &self, connection_id: &ConnectionId ) -> Vec< QueuedCommand >
  {
    let Some( agent ) = self.by_connection.get( connection_id ) else { return Vec::new() };
    let mut queue = agent.queued_commands.lock().unwrap();
    std::mem::take( &mut *queue )
  }

  /// Snapshot of every currently connected agent, for the heartbeat reaper
  /// (§5: "if `now - lastPing > 3*heartbeatInterval`, the reader may close
  /// with 1011").
  #[ must_use ]
  pub fn connected_agents( &self ) -> Vec< Arc< ConnectedAgent > >
  {
    self.by_connection.iter().map( |e| e.value().clone() ).collect()
  }

  /// §4.3 `cleanup` — graceful shutdown.
  pub async fn cleanup( &self )
  {
    let connection_ids: Vec< ConnectionId > = self.by_connection.iter().map( |e| e.key().clone() ).collect();
    for connection_id in connection_ids
    {
      let outbound = self.by_connection.get( &connection_id ).map( |a| a.outbound.clone() );
      if let Some( sender ) = outbound
      {
        let _ = sender.send( SocketCommand::Close { code: 1000, reason: "Server shutting down".into() } ).await;
      }
      let _ = self.unregister( connection_id ).await;
    }
  }
}

fn reject_all_pending( agent: &ConnectedAgent, reason: &str )
{
  let mut pending = agent.pending_requests.lock().unwrap();
  for ( _, request ) in pending.drain()
  {
    request.timeout_handle.abort();
    let _ = request.resolver.send( Err( reason.to_string() ) );
  }
}

fn parse_state( raw: &str ) -> AgentLifecycleState
{
  match raw
  {
    "ACTIVE" => AgentLifecycleState::Active,
    "BLOCKED" => AgentLifecycleState::Blocked,
    "EXPIRED" => AgentLifecycleState::Expired,
    _ => AgentLifecycleState::Pending,
  }
}

fn parse_power_state( raw: &str ) -> PowerState
{
  match raw
  {
    "ACTIVE" => PowerState::Active,
    "SLEEP" => PowerState::Sleep,
    _ => PowerState::Passive,
  }
}
