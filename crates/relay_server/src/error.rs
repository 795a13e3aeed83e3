//! Startup/configuration errors. Kept separate from [`relay_types::BrokerError`] —
//! nothing here is wire-facing, it only ever surfaces on `main`'s exit path.

#[ derive( Debug, thiserror::Error ) ]
pub enum ConfigError
{
  #[ error( "config file not found: {0}" ) ]
  NotFound( String ),

  #[ error( "failed to read config file: {0}" ) ]
  Io( #[ from ] std::io::Error ),

  #[ error( "invalid config TOML: {0}" ) ]
  Parse( #[ from ] toml::de::Error ),
}

pub type Result< T > = core::result::Result< T, ConfigError >;
