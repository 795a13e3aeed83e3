//! Configuration loading: `config.{env}.toml` selected by `RELAY_ENV`
//! (default `development`), with environment-variable overrides. Shape
//! mirrors `iron_token_manager::config::Config`.

use std::path::Path;

use serde::{ Deserialize, Serialize };

use crate::error::{ ConfigError, Result };

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct Config
{
  pub database: DatabaseConfig,
  /// `APP_URL` — the base URL OAuth audience binding checks against (§6.4).
  pub app_url: String,
  #[ serde( default ) ]
  pub oauth: OAuthSettings,
  #[ serde( default = "default_agent_socket" ) ]
  pub agent_socket: BindConfig,
  #[ serde( default = "default_tenant_http" ) ]
  pub tenant_http: BindConfig,
  #[ serde( default ) ]
  pub update_check: UpdateCheckConfig,
  #[ serde( default ) ]
  pub development: Option< DevelopmentConfig >,
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct UpdateCheckConfig
{
  /// §4.9 per-channel version cache TTL.
  #[ serde( default = "default_update_cache_ttl_secs" ) ]
  pub cache_ttl_secs: u64,
}

impl Default for UpdateCheckConfig
{
  fn default() -> Self
  {
    Self { cache_ttl_secs: default_update_cache_ttl_secs() }
  }
}

fn default_update_cache_ttl_secs() -> u64
{
  60
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct DatabaseConfig
{
  pub url: String,
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct OAuthSettings
{
  /// Gates the `POST /session/login` dev harness (SPEC_FULL supplemented feature 1).
  #[ serde( default ) ]
  pub dev_session_enabled: bool,
  #[ serde( default = "default_signing_key" ) ]
  pub session_signing_key: String,
}

impl Default for OAuthSettings
{
  fn default() -> Self
  {
    Self { dev_session_enabled: false, session_signing_key: default_signing_key() }
  }
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct BindConfig
{
  pub host: String,
  pub port: u16,
}

impl BindConfig
{
  #[ must_use ]
  pub fn socket_addr( &self ) -> String
  {
    format!( "{}:{}", self.host, self.port )
  }
}

#[ derive( Debug, Clone, Serialize, Deserialize ) ]
pub struct DevelopmentConfig
{
  #[ serde( default ) ]
  pub debug: bool,
}

fn default_signing_key() -> String
{
  "dev-signing-key-change-in-production".to_string()
}

fn default_agent_socket() -> BindConfig
{
  BindConfig { host: "0.0.0.0".to_string(), port: 7800 }
}

fn default_tenant_http() -> BindConfig
{
  BindConfig { host: "0.0.0.0".to_string(), port: 7801 }
}

impl Config
{
  /// Load configuration for the environment named by `RELAY_ENV` (default
  /// `development`).
  ///
  /// # Errors
  /// See [`Self::from_file`].
  pub fn load() -> Result< Self >
  {
    let env = std::env::var( "RELAY_ENV" ).unwrap_or_else( |_| "development".to_string() );
    Self::from_env( &env )
  }

  /// # Errors
  /// See [`Self::from_file`].
  pub fn from_env( env: &str ) -> Result< Self >
  {
    Self::from_file( &format!( "config.{env}.toml" ) )
  }

  /// # Errors
  /// [`ConfigError::NotFound`] if `path` doesn't exist, [`ConfigError::Io`]
  /// on a read failure, [`ConfigError::Parse`] on malformed TOML.
  pub fn from_file( path: &str ) -> Result< Self >
  {
    let config_path = Path::new( path );
    if !config_path.exists()
    {
      return Err( ConfigError::NotFound( path.to_string() ) );
    }

    let contents = std::fs::read_to_string( config_path )?;
    let mut config: Self = toml::from_str( &contents )?;
    config.apply_env_overrides();
    Ok( config )
  }

  fn apply_env_overrides( &mut self )
  {
    if let Ok( url ) = std::env::var( "DATABASE_URL" )
    {
      self.database.url = url;
    }
    if let Ok( app_url ) = std::env::var( "APP_URL" )
    {
      self.app_url = app_url;
    }
    if let Ok( key ) = std::env::var( "SESSION_SIGNING_KEY" )
    {
      self.oauth.session_signing_key = key;
    }
  }

  /// A self-contained development configuration, used when no
  /// `config.*.toml` is present (e.g. first run, or tests).
  #[ must_use ]
  pub fn default_dev() -> Self
  {
    Self
    {
      database: DatabaseConfig { url: "sqlite://./relay.db?mode=rwc".to_string() },
      app_url: "http://localhost:7801".to_string(),
      oauth: OAuthSettings { dev_session_enabled: true, session_signing_key: default_signing_key() },
      agent_socket: default_agent_socket(),
      tenant_http: default_tenant_http(),
      update_check: UpdateCheckConfig::default(),
      development: Some( DevelopmentConfig { debug: true } ),
    }
  }

  #[ must_use ]
  pub fn default_test() -> Self
  {
    Self
    {
      database: DatabaseConfig { url: "sqlite::memory:".to_string() },
      app_url: "http://localhost:7801".to_string(),
      oauth: OAuthSettings { dev_session_enabled: true, session_signing_key: default_signing_key() },
      agent_socket: default_agent_socket(),
      tenant_http: default_tenant_http(),
      update_check: UpdateCheckConfig::default(),
      development: None,
    }
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn default_dev_enables_the_session_harness()
  {
    let config = Config::default_dev();
    assert!( config.oauth.dev_session_enabled );
    assert_eq!( config.tenant_http.port, 7801 );
  }

  #[ test ]
  fn loading_a_missing_file_is_an_error()
  {
    assert!( matches!( Config::from_file( "definitely-missing.toml" ), Err( ConfigError::NotFound( _ ) ) ) );
  }

  #[ test ]
  fn loads_and_overrides_from_a_real_file()
  {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join( "config.test.toml" );
    std::fs::write(
      &path,
      r#"
      app_url = "http://example.test"
      [database]
      url = "sqlite::memory:"
      "#,
    ).unwrap();

    std::env::set_var( "APP_URL", "http://overridden.test" );
    let config = Config::from_file( path.to_str().unwrap() ).unwrap();
    std::env::remove_var( "APP_URL" );

    assert_eq!( config.app_url, "http://overridden.test" );
    assert_eq!( config.agent_socket.port, 7800 );
  }
}
