//! Repository: transactional CRUD over the persistent entities (§3.1).
//!
//! A single struct wrapping a `SqlitePool`, migrations applied in `new`, one
//! method per repository operation enumerated in §6. This schema has no
//! shipped history yet, so there is a single `CREATE TABLE IF NOT EXISTS`
//! migration rather than a chain of numbered guard-checked ones.

use chrono::{ DateTime, Duration, Utc };
use sqlx::{ sqlite::SqlitePoolOptions, Row, SqlitePool };

use crate::error::{ RepositoryError, Result };
use crate::models::{
  AgentBuildRow, AgentRow, AgentSessionRow, AgentVersionRow, AiConnectionRow, CommandLogRow,
  CustomerActivityPattern, LicenseRow, McpConnectionRow, OAuthAccessTokenRow,
  OAuthAuthorizationCodeRow, OAuthClientRow, UserRow,
};

const TRIAL_LICENSE_DAYS: i64 = 14;

/// Parameters for creating a brand-new agent row. Grouped into a struct
/// because `register` (§4.3) threads through a dozen optional system fields.
#[ derive( Debug, Clone, Default ) ]
pub struct NewAgentFields
{
  pub machine_fingerprint: Option< String >,
  pub fingerprint_raw: Option< String >,
  pub hostname: Option< String >,
  pub display_name: Option< String >,
  pub os_type: String,
  pub os_version: Option< String >,
  pub arch: Option< String >,
  pub agent_version: Option< String >,
  pub ip_address: Option< String >,
}

#[ derive( Debug, Clone ) ]
pub struct Repository
{
  pool: SqlitePool,
}

impl Repository
{
  /// Connect and apply the embedded schema.
  ///
  /// # Errors
  /// Returns an error if the connection or migration fails.
  pub async fn new( database_url: &str ) -> Result< Self >
  {
    let pool = SqlitePoolOptions::new()
      .max_connections( 5 )
      .connect( database_url )
      .await?;

    sqlx::raw_sql( include_str!( "migrations/001_initial_schema.sql" ) )
      .execute( &pool )
      .await?;

    Ok( Self { pool } )
  }

  #[ must_use ]
  pub fn pool( &self ) -> &SqlitePool
  {
    &self.pool
  }

  // ---------------------------------------------------------------- users

  /// Find a user by email, creating a fresh `ACTIVE` account if absent.
  /// Used to materialize the "system user" that owns an agent on first
  /// registration when no end-user account exists yet (§4.3 step 3).
  pub async fn ensure_user_by_email( &self, email: &str ) -> Result< UserRow >
  {
    if let Some( row ) = sqlx::query_as::< _, UserRow >( "SELECT * FROM users WHERE email = ?1" )
      .bind( email )
      .fetch_optional( &self.pool )
      .await?
    {
      return Ok( row );
    }

    let id = relay_types::UserId::generate().to_string();
    let now = Utc::now();

    sqlx::query(
      "INSERT INTO users (id, email, name, account_status, created_at) VALUES (?1, ?2, NULL, 'ACTIVE', ?3)"
    )
    .bind( &id )
    .bind( email )
    .bind( now )
    .execute( &self.pool )
    .await?;

    Ok( UserRow { id, email: email.to_string(), name: None, account_status: "ACTIVE".into(), created_at: now } )
  }

  pub async fn get_user( &self, id: &str ) -> Result< UserRow >
  {
    sqlx::query_as( "SELECT * FROM users WHERE id = ?1" )
      .bind( id )
      .fetch_optional( &self.pool )
      .await?
      .ok_or_else( || RepositoryError::NotFound( format!( "user {id}" ) ) )
  }

  // ------------------------------------------------------------ licenses

  /// Create a 14-day trial license for `user_id` (§4.3 step 3, new agent path).
  pub async fn create_trial_license( &self, user_id: &str ) -> Result< LicenseRow >
  {
    let id = relay_types::LicenseId::generate().to_string();
    let license_key = format!( "trial_{}", uuid::Uuid::new_v4() );
    let now = Utc::now();
    let trial_ends = now + Duration::days( TRIAL_LICENSE_DAYS );

    sqlx::query(
      "INSERT INTO licenses
         (id, user_id, license_key, product_type, status, valid_until, is_trial, trial_started, trial_ends)
       VALUES (?1, ?2, ?3, 'desktop', 'ACTIVE', NULL, 1, ?4, ?5)"
    )
    .bind( &id )
    .bind( user_id )
    .bind( &license_key )
    .bind( now )
    .bind( trial_ends )
    .execute( &self.pool )
    .await?;

    Ok( LicenseRow
    {
      id,
      user_id: user_id.to_string(),
      license_key,
      product_type: "desktop".into(),
      status: "ACTIVE".into(),
      valid_until: None,
      is_trial: true,
      trial_started: Some( now ),
      trial_ends: Some( trial_ends ),
    } )
  }

  pub async fn get_license( &self, id: &str ) -> Result< LicenseRow >
  {
    sqlx::query_as( "SELECT * FROM licenses WHERE id = ?1" )
      .bind( id )
      .fetch_optional( &self.pool )
      .await?
      .ok_or_else( || RepositoryError::NotFound( format!( "license {id}" ) ) )
  }

  pub async fn set_license_status( &self, id: &str, status: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE licenses SET status = ?1 WHERE id = ?2" )
      .bind( status )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  // --------------------------------------------------------------- agents

  /// Repository upsert by `(customerId, machineId)` (§4.3 step 3).
  /// Returns the row and whether it was newly created.
  pub async fn upsert_agent(
    &self,
    customer_id: Option< &str >,
    machine_id: &str,
    owner_user_id: &str,
    license_id: &str,
    fields: &NewAgentFields,
  ) -> Result< ( AgentRow, bool ) >
  {
    let existing: Option< AgentRow > = sqlx::query_as(
      "SELECT * FROM agents WHERE machine_id = ?1 AND (customer_id IS ?2)"
    )
    .bind( machine_id )
    .bind( customer_id )
    .fetch_optional( &self.pool )
    .await?;

    let now = Utc::now();

    if let Some( mut row ) = existing
    {
      sqlx::query(
        "UPDATE agents SET
           hostname = ?1, display_name = ?2, os_type = ?3, os_version = ?4, arch = ?5,
           agent_version = ?6, ip_address = ?7, status = 'ONLINE', last_seen_at = ?8, last_activity = ?8
         WHERE id = ?9"
      )
      .bind( &fields.hostname )
      .bind( &fields.display_name )
      .bind( &fields.os_type )
      .bind( &fields.os_version )
      .bind( &fields.arch )
      .bind( &fields.agent_version )
      .bind( &fields.ip_address )
      .bind( now )
      .bind( &row.id )
      .execute( &self.pool )
      .await?;

      row.hostname = fields.hostname.clone();
      row.display_name = fields.display_name.clone();
      row.os_type = fields.os_type.clone();
      row.os_version = fields.os_version.clone();
      row.arch = fields.arch.clone();
      row.agent_version = fields.agent_version.clone();
      row.ip_address = fields.ip_address.clone();
      row.status = "ONLINE".into();
      row.last_seen_at = now;
      row.last_activity = now;

      return Ok( ( row, false ) );
    }

    let id = relay_types::AgentId::generate().to_string();
    let agent_key = format!( "ak_{}", uuid::Uuid::new_v4().simple() );

    sqlx::query(
      "INSERT INTO agents
         (id, license_id, owner_user_id, agent_key, customer_id, machine_id, machine_fingerprint,
          fingerprint_raw, hostname, display_name, os_type, os_version, arch, agent_version,
          ip_address, status, state, power_state, is_screen_locked, current_task, license_uuid,
          first_seen_at, last_seen_at, last_activity, activated_at)
       VALUES
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
          'ONLINE', 'PENDING', 'PASSIVE', 0, NULL, NULL, ?16, ?16, ?16, NULL)"
    )
    .bind( &id )
    .bind( license_id )
    .bind( owner_user_id )
    .bind( &agent_key )
    .bind( customer_id )
    .bind( machine_id )
    .bind( &fields.machine_fingerprint )
    .bind( &fields.fingerprint_raw )
    .bind( &fields.hostname )
    .bind( &fields.display_name )
    .bind( &fields.os_type )
    .bind( &fields.os_version )
    .bind( &fields.arch )
    .bind( &fields.agent_version )
    .bind( &fields.ip_address )
    .bind( now )
    .execute( &self.pool )
    .await?;

    let row = AgentRow
    {
      id,
      license_id: license_id.to_string(),
      owner_user_id: owner_user_id.to_string(),
      agent_key,
      customer_id: customer_id.map( str::to_string ),
      machine_id: Some( machine_id.to_string() ),
      machine_fingerprint: fields.machine_fingerprint.clone(),
      fingerprint_raw: fields.fingerprint_raw.clone(),
      hostname: fields.hostname.clone(),
      display_name: fields.display_name.clone(),
      os_type: fields.os_type.clone(),
      os_version: fields.os_version.clone(),
      arch: fields.arch.clone(),
      agent_version: fields.agent_version.clone(),
      ip_address: fields.ip_address.clone(),
      status: "ONLINE".into(),
      state: "PENDING".into(),
      power_state: "PASSIVE".into(),
      is_screen_locked: false,
      current_task: None,
      license_uuid: None,
      first_seen_at: now,
      last_seen_at: now,
      last_activity: now,
      activated_at: None,
    };

    Ok( ( row, true ) )
  }

  /// Look up an agent by its natural key without creating anything (§4.3
  /// step 3, used to decide whether `register` needs a fresh system user and
  /// trial license before upserting).
  pub async fn find_agent_by_machine( &self, customer_id: Option< &str >, machine_id: &str ) -> Result< Option< AgentRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM agents WHERE machine_id = ?1 AND (customer_id IS ?2)" )
        .bind( machine_id )
        .bind( customer_id )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  pub async fn get_agent( &self, id: &str ) -> Result< AgentRow >
  {
    sqlx::query_as( "SELECT * FROM agents WHERE id = ?1" )
      .bind( id )
      .fetch_optional( &self.pool )
      .await?
      .ok_or_else( || RepositoryError::NotFound( format!( "agent {id}" ) ) )
  }

  pub async fn set_agent_fingerprint( &self, id: &str, fingerprint: &str, raw_json: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE agents SET machine_fingerprint = ?1, fingerprint_raw = ?2 WHERE id = ?3" )
      .bind( fingerprint )
      .bind( raw_json )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  pub async fn set_agent_state( &self, id: &str, state: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE agents SET state = ?1 WHERE id = ?2" )
      .bind( state )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  pub async fn mark_agent_offline( &self, id: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE agents SET status = 'OFFLINE', current_task = NULL WHERE id = ?1" )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  /// `updateAgentHeartbeat` (§4.3 `updateState`) — merges the reported fields
  /// and bumps `lastActivity`.
  pub async fn update_agent_heartbeat(
    &self,
    id: &str,
    power_state: Option< &str >,
    is_screen_locked: Option< bool >,
    current_task: Option< &str >,
  ) -> Result< () >
  {
    let now = Utc::now();
    if let Some( power_state ) = power_state
    {
      sqlx::query( "UPDATE agents SET power_state = ?1, last_activity = ?2 WHERE id = ?3" )
        .bind( power_state )
        .bind( now )
        .bind( id )
        .execute( &self.pool )
        .await?;
    }
    if let Some( locked ) = is_screen_locked
    {
      sqlx::query( "UPDATE agents SET is_screen_locked = ?1, last_activity = ?2 WHERE id = ?3" )
        .bind( locked )
        .bind( now )
        .bind( id )
        .execute( &self.pool )
        .await?;
    }
    if let Some( task ) = current_task
    {
      sqlx::query( "UPDATE agents SET current_task = ?1, last_activity = ?2 WHERE id = ?3" )
        .bind( task )
        .bind( now )
        .bind( id )
        .execute( &self.pool )
        .await?;
    }
    Ok( () )
  }

  pub async fn list_agents_for_user( &self, owner_user_id: &str ) -> Result< Vec< AgentRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM agents WHERE owner_user_id = ?1 ORDER BY first_seen_at" )
        .bind( owner_user_id )
        .fetch_all( &self.pool )
        .await?
    )
  }

  // ----------------------------------------------------------- sessions

  pub async fn open_agent_session( &self, agent_id: &str, ip_address: &str ) -> Result< String >
  {
    let id = relay_types::AgentSessionId::generate().to_string();
    sqlx::query(
      "INSERT INTO agent_sessions (id, agent_id, session_start, session_end, duration_minutes, ip_address)
       VALUES (?1, ?2, ?3, NULL, NULL, ?4)"
    )
    .bind( &id )
    .bind( agent_id )
    .bind( Utc::now() )
    .bind( ip_address )
    .execute( &self.pool )
    .await?;
    Ok( id )
  }

  /// Close a session and compute `durationMinutes` (§4.3 `unregister`).
  pub async fn close_agent_session( &self, session_id: &str ) -> Result< i64 >
  {
    let row: AgentSessionRow = sqlx::query_as( "SELECT * FROM agent_sessions WHERE id = ?1" )
      .bind( session_id )
      .fetch_optional( &self.pool )
      .await?
      .ok_or_else( || RepositoryError::NotFound( format!( "agent session {session_id}" ) ) )?;

    let end = Utc::now();
    let duration_minutes = ( end - row.session_start ).num_minutes();

    sqlx::query( "UPDATE agent_sessions SET session_end = ?1, duration_minutes = ?2 WHERE id = ?3" )
      .bind( end )
      .bind( duration_minutes )
      .bind( session_id )
      .execute( &self.pool )
      .await?;

    Ok( duration_minutes )
  }

  // --------------------------------------------------- fingerprint changes

  pub async fn log_fingerprint_change(
    &self,
    agent_id: &str,
    change_type: &str,
    previous_value: Option< &str >,
    new_value: Option< &str >,
    action_taken: &str,
    details: Option< &str >,
  ) -> Result< () >
  {
    sqlx::query(
      "INSERT INTO fingerprint_changes
         (agent_id, change_type, previous_value, new_value, action_taken, details, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    )
    .bind( agent_id )
    .bind( change_type )
    .bind( previous_value )
    .bind( new_value )
    .bind( action_taken )
    .bind( details )
    .bind( Utc::now() )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  // -------------------------------------------------------- command log

  pub async fn insert_command_sent(
    &self,
    agent_id: &str,
    ai_connection_id: Option< &str >,
    method: &str,
    tool_name: Option< &str >,
    params_json: &str,
    ip_address: Option< &str >,
  ) -> Result< String >
  {
    let id = relay_types::CommandLogId::generate().to_string();
    sqlx::query(
      "INSERT INTO command_log
         (id, agent_id, ai_connection_id, method, tool_name, params, status, result,
          error_message, started_at, completed_at, duration_ms, ip_address)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'SENT', NULL, NULL, ?7, NULL, NULL, ?8)"
    )
    .bind( &id )
    .bind( agent_id )
    .bind( ai_connection_id )
    .bind( method )
    .bind( tool_name )
    .bind( params_json )
    .bind( Utc::now() )
    .bind( ip_address )
    .execute( &self.pool )
    .await?;
    Ok( id )
  }

  /// Transition a `CommandLog` row out of `SENT` (§3.3 invariant: only
  /// `SENT → {COMPLETED, FAILED, TIMEOUT}`, `completedAt`/`durationMs` set
  /// exactly then).
  pub async fn complete_command(
    &self,
    id: &str,
    status: &str,
    result_json: Option< &str >,
    error_message: Option< &str >,
  ) -> Result< () >
  {
    let row: CommandLogRow = sqlx::query_as( "SELECT * FROM command_log WHERE id = ?1" )
      .bind( id )
      .fetch_optional( &self.pool )
      .await?
      .ok_or_else( || RepositoryError::NotFound( format!( "command log {id}" ) ) )?;

    if row.status != "SENT"
    {
      return Err( RepositoryError::Conflict( format!( "command log {id} already {}", row.status ) ) );
    }

    let completed_at = Utc::now();
    let duration_ms = ( completed_at - row.started_at ).num_milliseconds();

    sqlx::query(
      "UPDATE command_log SET status = ?1, result = ?2, error_message = ?3, completed_at = ?4, duration_ms = ?5
       WHERE id = ?6"
    )
    .bind( status )
    .bind( result_json )
    .bind( error_message )
    .bind( completed_at )
    .bind( duration_ms )
    .bind( id )
    .execute( &self.pool )
    .await?;

    Ok( () )
  }

  // ------------------------------------------------------ mcp connections

  pub async fn get_mcp_connection_by_uuid( &self, endpoint_uuid: &str ) -> Result< Option< McpConnectionRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM mcp_connections WHERE endpoint_uuid = ?1" )
        .bind( endpoint_uuid )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  pub async fn create_mcp_connection( &self, user_id: &str, name: &str ) -> Result< McpConnectionRow >
  {
    let id = relay_types::McpConnectionId::generate().to_string();
    let endpoint_uuid = uuid::Uuid::new_v4().to_string();

    sqlx::query(
      "INSERT INTO mcp_connections (id, user_id, endpoint_uuid, name, status, total_requests, last_used_at)
       VALUES (?1, ?2, ?3, ?4, 'ACTIVE', 0, NULL)"
    )
    .bind( &id )
    .bind( user_id )
    .bind( &endpoint_uuid )
    .bind( name )
    .execute( &self.pool )
    .await?;

    Ok( McpConnectionRow
    {
      id, user_id: user_id.to_string(), endpoint_uuid, name: name.to_string(),
      status: "ACTIVE".into(), total_requests: 0, last_used_at: None,
    } )
  }

  /// Touch `lastUsedAt` and increment `totalRequests` (§4.7 step 5).
  pub async fn touch_mcp_connection( &self, id: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE mcp_connections SET total_requests = total_requests + 1, last_used_at = ?1 WHERE id = ?2" )
      .bind( Utc::now() )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  // -------------------------------------------------------- oauth clients

  pub async fn create_oauth_client(
    &self,
    client_id: &str,
    client_secret_hash: Option< &str >,
    redirect_uris_json: &str,
    grant_types_json: &str,
    response_types_json: &str,
    scopes_json: &str,
    token_endpoint_auth_method: &str,
    registration_access_token_hash: &str,
  ) -> Result< () >
  {
    sqlx::query(
      "INSERT INTO oauth_clients
         (client_id, client_secret_hash, redirect_uris, grant_types, response_types, scopes,
          token_endpoint_auth_method, registration_access_token_hash)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    )
    .bind( client_id )
    .bind( client_secret_hash )
    .bind( redirect_uris_json )
    .bind( grant_types_json )
    .bind( response_types_json )
    .bind( scopes_json )
    .bind( token_endpoint_auth_method )
    .bind( registration_access_token_hash )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  pub async fn get_oauth_client( &self, client_id: &str ) -> Result< Option< OAuthClientRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM oauth_clients WHERE client_id = ?1" )
        .bind( client_id )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  // ------------------------------------------------- oauth authz codes

  #[ allow( clippy::too_many_arguments ) ]
  pub async fn create_authorization_code(
    &self,
    code_hash: &str,
    client_id: &str,
    user_id: &str,
    connection_id: &str,
    redirect_uri: &str,
    scope_json: &str,
    code_challenge: &str,
    audience: &str,
    expires_at: DateTime< Utc >,
  ) -> Result< () >
  {
    sqlx::query(
      "INSERT INTO oauth_authorization_codes
         (code_hash, client_id, user_id, connection_id, redirect_uri, scope, code_challenge,
          code_challenge_method, audience, expires_at, consumed_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'S256', ?8, ?9, NULL)"
    )
    .bind( code_hash )
    .bind( client_id )
    .bind( user_id )
    .bind( connection_id )
    .bind( redirect_uri )
    .bind( scope_json )
    .bind( code_challenge )
    .bind( audience )
    .bind( expires_at )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  pub async fn get_authorization_code( &self, code_hash: &str ) -> Result< Option< OAuthAuthorizationCodeRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM oauth_authorization_codes WHERE code_hash = ?1" )
        .bind( code_hash )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  /// Consume the authorization code and mint the access (+ optional refresh)
  /// token in one transaction (§3.3: single-use code, §5: issuance atomicity).
  #[ allow( clippy::too_many_arguments ) ]
  pub async fn consume_code_and_issue_token(
    &self,
    code_hash: &str,
    access_token_hash: &str,
    refresh_token_hash: Option< &str >,
    user_id: &str,
    connection_id: &str,
    client_id: &str,
    scope_json: &str,
    audience: &str,
    access_expires_at: DateTime< Utc >,
    refresh_expires_at: Option< DateTime< Utc > >,
  ) -> Result< String >
  {
    let mut tx = self.pool.begin().await?;

    let updated = sqlx::query(
      "UPDATE oauth_authorization_codes SET consumed_at = ?1 WHERE code_hash = ?2 AND consumed_at IS NULL"
    )
    .bind( Utc::now() )
    .bind( code_hash )
    .execute( &mut *tx )
    .await?;

    if updated.rows_affected() == 0
    {
      tx.rollback().await?;
      return Err( RepositoryError::Conflict( "authorization code already consumed".into() ) );
    }

    let token_id = format!( "atk_{}", uuid::Uuid::new_v4() );

    sqlx::query(
      "INSERT INTO oauth_access_tokens
         (id, access_token_hash, user_id, connection_id, client_id, scope, audience,
          access_expires_at, refresh_token_hash, refresh_expires_at, revoked_at, last_used_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL)"
    )
    .bind( &token_id )
    .bind( access_token_hash )
    .bind( user_id )
    .bind( connection_id )
    .bind( client_id )
    .bind( scope_json )
    .bind( audience )
    .bind( access_expires_at )
    .bind( refresh_token_hash )
    .bind( refresh_expires_at )
    .execute( &mut *tx )
    .await?;

    tx.commit().await?;
    Ok( token_id )
  }

  // ------------------------------------------------------ access tokens

  pub async fn get_access_token_by_hash( &self, access_token_hash: &str ) -> Result< Option< OAuthAccessTokenRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM oauth_access_tokens WHERE access_token_hash = ?1" )
        .bind( access_token_hash )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  pub async fn get_access_token_by_refresh_hash( &self, refresh_token_hash: &str ) -> Result< Option< OAuthAccessTokenRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM oauth_access_tokens WHERE refresh_token_hash = ?1" )
        .bind( refresh_token_hash )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  pub async fn touch_access_token( &self, id: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE oauth_access_tokens SET last_used_at = ?1 WHERE id = ?2" )
      .bind( Utc::now() )
      .bind( id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  /// Idempotent revoke (§8 round-trip property: revoking twice writes once).
  pub async fn revoke_access_token( &self, access_token_hash: &str ) -> Result< () >
  {
    sqlx::query(
      "UPDATE oauth_access_tokens SET revoked_at = ?1 WHERE access_token_hash = ?2 AND revoked_at IS NULL"
    )
    .bind( Utc::now() )
    .bind( access_token_hash )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  /// Rotate a refresh token: revoke the old row, insert a freshly-minted pair,
  /// in one transaction (§4.6 `grant_type=refresh_token`).
  #[ allow( clippy::too_many_arguments ) ]
  pub async fn rotate_refresh_token(
    &self,
    old_refresh_token_hash: &str,
    new_access_token_hash: &str,
    new_refresh_token_hash: &str,
    user_id: &str,
    connection_id: &str,
    client_id: &str,
    scope_json: &str,
    audience: &str,
    access_expires_at: DateTime< Utc >,
    refresh_expires_at: DateTime< Utc >,
  ) -> Result< String >
  {
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      "UPDATE oauth_access_tokens SET revoked_at = ?1 WHERE refresh_token_hash = ?2 AND revoked_at IS NULL"
    )
    .bind( Utc::now() )
    .bind( old_refresh_token_hash )
    .execute( &mut *tx )
    .await?;

    let token_id = format!( "atk_{}", uuid::Uuid::new_v4() );

    sqlx::query(
      "INSERT INTO oauth_access_tokens
         (id, access_token_hash, user_id, connection_id, client_id, scope, audience,
          access_expires_at, refresh_token_hash, refresh_expires_at, revoked_at, last_used_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL)"
    )
    .bind( &token_id )
    .bind( new_access_token_hash )
    .bind( user_id )
    .bind( connection_id )
    .bind( client_id )
    .bind( scope_json )
    .bind( audience )
    .bind( access_expires_at )
    .bind( new_refresh_token_hash )
    .bind( refresh_expires_at )
    .execute( &mut *tx )
    .await?;

    tx.commit().await?;
    Ok( token_id )
  }

  // --------------------------------------------------------- request log

  pub async fn append_mcp_request_log( &self, connection_id: &str, method: &str, status_code: i32 ) -> Result< () >
  {
    sqlx::query( "INSERT INTO mcp_request_log (connection_id, method, status_code, created_at) VALUES (?1, ?2, ?3, ?4)" )
      .bind( connection_id )
      .bind( method )
      .bind( status_code )
      .bind( Utc::now() )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  // ------------------------------------------------------- ai connections

  pub async fn upsert_ai_connection( &self, session_id: &str, user_id: &str, client_name: Option< &str >, client_version: Option< &str > ) -> Result< () >
  {
    let now = Utc::now();
    sqlx::query(
      "INSERT INTO ai_connections (session_id, user_id, client_name, client_version, is_active, authorized_at, disconnected_at, last_activity_at)
       VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL, ?5)
       ON CONFLICT(session_id) DO UPDATE SET is_active = 1, last_activity_at = ?5"
    )
    .bind( session_id )
    .bind( user_id )
    .bind( client_name )
    .bind( client_version )
    .bind( now )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  pub async fn disconnect_ai_connection( &self, session_id: &str ) -> Result< () >
  {
    sqlx::query( "UPDATE ai_connections SET is_active = 0, disconnected_at = ?1 WHERE session_id = ?2" )
      .bind( Utc::now() )
      .bind( session_id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  pub async fn get_ai_connection( &self, session_id: &str ) -> Result< Option< AiConnectionRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM ai_connections WHERE session_id = ?1" )
        .bind( session_id )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  // ------------------------------------------------ agent version/builds

  pub async fn get_agent_version( &self, channel: &str ) -> Result< Option< AgentVersionRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM agent_versions WHERE channel = ?1" )
        .bind( channel )
        .fetch_optional( &self.pool )
        .await?
    )
  }

  pub async fn set_agent_version( &self, channel: &str, version: &str, min_version: Option< &str >, rollout_percent: i64 ) -> Result< () >
  {
    sqlx::query(
      "INSERT INTO agent_versions (channel, version, min_version, rollout_percent) VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT(channel) DO UPDATE SET version = ?2, min_version = ?3, rollout_percent = ?4"
    )
    .bind( channel )
    .bind( version )
    .bind( min_version )
    .bind( rollout_percent )
    .execute( &self.pool )
    .await?;
    Ok( () )
  }

  pub async fn list_agent_builds( &self, channel: &str ) -> Result< Vec< AgentBuildRow > >
  {
    Ok(
      sqlx::query_as( "SELECT * FROM agent_builds WHERE channel = ?1" )
        .bind( channel )
        .fetch_all( &self.pool )
        .await?
    )
  }

  pub async fn add_agent_build( &self, channel: &str, platform_arch: &str ) -> Result< () >
  {
    sqlx::query( "INSERT OR IGNORE INTO agent_builds (channel, platform_arch) VALUES (?1, ?2)" )
      .bind( channel )
      .bind( platform_arch )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }

  // --------------------------------------------------------- activity

  /// Increment the hour bucket for `user_id` and return the new 24-slot
  /// histogram together with the running total (§4.3.3).
  pub async fn record_activity_hour( &self, user_id: &str, hour: u32 ) -> Result< CustomerActivityPattern >
  {
    let existing: Option< ( String, ) > = sqlx::query_as(
      "SELECT hourly_activity FROM customer_activity_pattern WHERE user_id = ?1"
    )
    .bind( user_id )
    .fetch_optional( &self.pool )
    .await?;

    let mut histogram: [ i64; 24 ] = match existing
    {
      Some( ( json, ) ) => serde_json::from_str( &json ).unwrap_or( [ 0; 24 ] ),
      None => [ 0; 24 ],
    };

    histogram[ hour as usize % 24 ] += 1;
    let json = serde_json::to_string( &histogram ).expect( "fixed-size int array serializes" );

    sqlx::query(
      "INSERT INTO customer_activity_pattern (user_id, hourly_activity, quiet_hours_start, quiet_hours_end)
       VALUES (?1, ?2, NULL, NULL)
       ON CONFLICT(user_id) DO UPDATE SET hourly_activity = ?2"
    )
    .bind( user_id )
    .bind( &json )
    .execute( &self.pool )
    .await?;

    let row = sqlx::query( "SELECT quiet_hours_start, quiet_hours_end FROM customer_activity_pattern WHERE user_id = ?1" )
      .bind( user_id )
      .fetch_one( &self.pool )
      .await?;

    Ok( CustomerActivityPattern
    {
      user_id: user_id.to_string(),
      hourly_activity: histogram,
      quiet_hours_start: row.try_get::< Option< i64 >, _ >( "quiet_hours_start" ).unwrap_or( None ),
      quiet_hours_end: row.try_get::< Option< i64 >, _ >( "quiet_hours_end" ).unwrap_or( None ),
    } )
  }

  pub async fn set_quiet_hours( &self, user_id: &str, start: i64, end: i64 ) -> Result< () >
  {
    sqlx::query( "UPDATE customer_activity_pattern SET quiet_hours_start = ?1, quiet_hours_end = ?2 WHERE user_id = ?3" )
      .bind( start )
      .bind( end )
      .bind( user_id )
      .execute( &self.pool )
      .await?;
    Ok( () )
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  async fn test_repo() -> Repository
  {
    Repository::new( "sqlite::memory:" ).await.expect( "in-memory repository" )
  }

  #[ tokio::test ]
  async fn ensure_user_by_email_is_idempotent()
  {
    let repo = test_repo().await;
    let first = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let second = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    assert_eq!( first.id, second.id );
  }

  #[ tokio::test ]
  async fn trial_license_is_effective_for_fourteen_days()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let license = repo.create_trial_license( &user.id ).await.unwrap();
    assert!( license.is_effective( Utc::now() ) );
    assert!( !license.is_effective( Utc::now() + Duration::days( 15 ) ) );
  }

  #[ tokio::test ]
  async fn upsert_agent_creates_then_updates_same_row()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let license = repo.create_trial_license( &user.id ).await.unwrap();

    let fields = NewAgentFields::default();
    let ( created, was_new ) = repo
      .upsert_agent( Some( "cust-1" ), "machine-1", &user.id, &license.id, &fields )
      .await
      .unwrap();
    assert!( was_new );

    let ( updated, was_new_again ) = repo
      .upsert_agent( Some( "cust-1" ), "machine-1", &user.id, &license.id, &fields )
      .await
      .unwrap();
    assert!( !was_new_again );
    assert_eq!( created.id, updated.id );
  }

  #[ tokio::test ]
  async fn authorization_code_is_single_use()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let conn = repo.create_mcp_connection( &user.id, "test" ).await.unwrap();
    repo.create_oauth_client( "client-1", None, "[]", "[]", "[]", "[]", "none", "rat-hash" ).await.unwrap();

    let expires = Utc::now() + Duration::seconds( 600 );
    repo.create_authorization_code(
      "code-hash", "client-1", &user.id, &conn.id, "http://127.0.0.1/cb", "[]", "challenge", "https://host/mcp/x", expires
    ).await.unwrap();

    let first = repo.consume_code_and_issue_token(
      "code-hash", "at-hash", Some( "rt-hash" ), &user.id, &conn.id, "client-1", "[]", "https://host/mcp/x",
      Utc::now() + Duration::seconds( 3600 ), Some( Utc::now() + Duration::days( 30 ) ),
    ).await;
    assert!( first.is_ok() );

    let second = repo.consume_code_and_issue_token(
      "code-hash", "at-hash-2", None, &user.id, &conn.id, "client-1", "[]", "https://host/mcp/x",
      Utc::now() + Duration::seconds( 3600 ), None,
    ).await;
    assert!( second.is_err() );
  }

  #[ tokio::test ]
  async fn revoking_twice_is_a_noop()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let conn = repo.create_mcp_connection( &user.id, "test" ).await.unwrap();
    repo.create_oauth_client( "client-1", None, "[]", "[]", "[]", "[]", "none", "rat-hash" ).await.unwrap();

    let expires = Utc::now() + Duration::seconds( 600 );
    repo.create_authorization_code(
      "code-hash", "client-1", &user.id, &conn.id, "http://127.0.0.1/cb", "[]", "challenge", "https://host/mcp/x", expires
    ).await.unwrap();
    repo.consume_code_and_issue_token(
      "code-hash", "at-hash", None, &user.id, &conn.id, "client-1", "[]", "https://host/mcp/x",
      Utc::now() + Duration::seconds( 3600 ), None,
    ).await.unwrap();

    repo.revoke_access_token( "at-hash" ).await.unwrap();
    let first_revoke = repo.get_access_token_by_hash( "at-hash" ).await.unwrap().unwrap().revoked_at;
    repo.revoke_access_token( "at-hash" ).await.unwrap();
    let second_revoke = repo.get_access_token_by_hash( "at-hash" ).await.unwrap().unwrap().revoked_at;
    assert_eq!( first_revoke, second_revoke );
  }

  #[ tokio::test ]
  async fn command_log_transitions_only_out_of_sent()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    let license = repo.create_trial_license( &user.id ).await.unwrap();
    let fields = NewAgentFields::default();
    let ( agent, _ ) = repo.upsert_agent( None, "m1", &user.id, &license.id, &fields ).await.unwrap();

    let id = repo.insert_command_sent( &agent.id, None, "tools/call", Some( "ping" ), "{}", None ).await.unwrap();
    repo.complete_command( &id, "COMPLETED", Some( "{}" ), None ).await.unwrap();
    let second = repo.complete_command( &id, "FAILED", None, Some( "boom" ) ).await;
    assert!( second.is_err() );
  }

  #[ tokio::test ]
  async fn record_activity_hour_accumulates()
  {
    let repo = test_repo().await;
    let user = repo.ensure_user_by_email( "owner@example.com" ).await.unwrap();
    repo.record_activity_hour( &user.id, 5 ).await.unwrap();
    let pattern = repo.record_activity_hour( &user.id, 5 ).await.unwrap();
    assert_eq!( pattern.hourly_activity[ 5 ], 2 );
  }
}
