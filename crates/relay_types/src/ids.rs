//! Type-safe entity identifiers.
//!
//! Database-backed entities use a `prefix_<uuid>` newtype so a `LicenseId` can never
//! be passed where an `AgentId` is expected. Ephemeral, in-process-only identifiers
//! (the live socket's `ConnectionId`) are plain UUID newtypes with no persistence
//! story at all.

use std::fmt;
use uuid::Uuid;

macro_rules! entity_id
{
  ( $name:ident, $prefix:literal ) =>
  {
    #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize ) ]
    #[ serde( transparent ) ]
    pub struct $name( Uuid );

    impl $name
    {
      /// Generate a fresh, random identifier.
      #[ must_use ]
      pub fn generate() -> Self
      {
        Self( Uuid::new_v4() )
      }

      /// Wrap an already-known UUID (e.g. one read back from storage).
      #[ must_use ]
      pub fn from_uuid( id: Uuid ) -> Self
      {
        Self( id )
      }

      #[ must_use ]
      pub fn as_uuid( &self ) -> Uuid
      {
        self.0
      }

      /// Parse the `prefix_<uuid>` wire format.
      pub fn parse( s: &str ) -> Result< Self, IdError >
      {
        let rest = s.strip_prefix( concat!( $prefix, "_" ) ).ok_or( IdError::WrongPrefix( $prefix ) )?;
        let uuid = Uuid::parse_str( rest ).map_err( |_| IdError::MalformedUuid )?;
        Ok( Self( uuid ) )
      }
    }

    impl fmt::Display for $name
    {
      fn fmt( &self, f: &mut fmt::Formatter< '_ > ) -> fmt::Result
      {
        write!( f, "{}_{}", $prefix, self.0 )
      }
    }
  };
}

entity_id!( UserId, "user" );
entity_id!( LicenseId, "lic" );
entity_id!( AgentId, "agent" );
entity_id!( AgentSessionId, "asess" );
entity_id!( CommandLogId, "cmd" );
entity_id!( McpConnectionId, "mcpconn" );
entity_id!( OAuthClientId, "client" );
entity_id!( AiConnectionId, "aiconn" );
entity_id!( TerminalSessionId, "term" );

/// Ephemeral socket identity — never persisted, regenerated every reconnect.
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize ) ]
#[ serde( transparent ) ]
pub struct ConnectionId( Uuid );

impl ConnectionId
{
  #[ must_use ]
  pub fn generate() -> Self
  {
    Self( Uuid::new_v4() )
  }

  #[ must_use ]
  pub fn from_uuid( id: Uuid ) -> Self
  {
    Self( id )
  }

  #[ must_use ]
  pub fn as_uuid( &self ) -> Uuid
  {
    self.0
  }
}

impl fmt::Display for ConnectionId
{
  fn fmt( &self, f: &mut fmt::Formatter< '_ > ) -> fmt::Result
  {
    write!( f, "{}", self.0 )
  }
}

impl std::str::FromStr for ConnectionId
{
  type Err = IdError;

  fn from_str( s: &str ) -> Result< Self, Self::Err >
  {
    Uuid::parse_str( s ).map( Self ).map_err( |_| IdError::MalformedUuid )
  }
}

/// Error parsing an entity id from its wire representation.
#[ derive( Debug, thiserror::Error, PartialEq, Eq ) ]
pub enum IdError
{
  #[ error( "expected id prefixed with {0}_" ) ]
  WrongPrefix( &'static str ),
  #[ error( "malformed uuid body" ) ]
  MalformedUuid,
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn round_trips_through_display_and_parse()
  {
    let id = AgentId::generate();
    let text = id.to_string();
    assert!( text.starts_with( "agent_" ) );
    assert_eq!( AgentId::parse( &text ).unwrap(), id );
  }

  #[ test ]
  fn rejects_wrong_prefix()
  {
    let agent = AgentId::generate().to_string();
    assert!( matches!( LicenseId::parse( &agent ), Err( IdError::WrongPrefix( "lic" ) ) ) );
  }
}
