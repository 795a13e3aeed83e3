//! §4.2 Scope model.

use serde::{ Deserialize, Serialize };
use std::fmt;

/// The five OAuth scopes the tenant endpoint understands.
#[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize ) ]
pub enum Scope
{
  #[ serde( rename = "mcp:tools" ) ]
  Tools,
  #[ serde( rename = "mcp:resources" ) ]
  Resources,
  #[ serde( rename = "mcp:prompts" ) ]
  Prompts,
  #[ serde( rename = "mcp:agents:read" ) ]
  AgentsRead,
  #[ serde( rename = "mcp:agents:write" ) ]
  AgentsWrite,
}

impl Scope
{
  #[ must_use ]
  pub fn as_str( self ) -> &'static str
  {
    match self
    {
      Self::Tools => "mcp:tools",
      Self::Resources => "mcp:resources",
      Self::Prompts => "mcp:prompts",
      Self::AgentsRead => "mcp:agents:read",
      Self::AgentsWrite => "mcp:agents:write",
    }
  }

  #[ must_use ]
  pub fn all() -> &'static [ Scope ]
  {
    &[ Self::Tools, Self::Resources, Self::Prompts, Self::AgentsRead, Self::AgentsWrite ]
  }

  pub fn parse( s: &str ) -> Option< Self >
  {
    Self::all().iter().copied().find( |scope| scope.as_str() == s )
  }
}

impl fmt::Display for Scope
{
  fn fmt( &self, f: &mut fmt::Formatter< '_ > ) -> fmt::Result
  {
    f.write_str( self.as_str() )
  }
}

/// Parse a space-separated scope string, reporting every token that isn't a known
/// scope (§4.2: "Unknown scopes ... fail validation with the list of offending
/// values").
pub fn parse_scope_list( raw: &str ) -> Result< Vec< Scope >, Vec< String > >
{
  let mut scopes = Vec::new();
  let mut unknown = Vec::new();

  for token in raw.split_whitespace()
  {
    match Scope::parse( token )
    {
      Some( scope ) => scopes.push( scope ),
      None => unknown.push( token.to_string() ),
    }
  }

  if unknown.is_empty()
  {
    Ok( scopes )
  }
  else
  {
    Err( unknown )
  }
}

/// Render a scope list back into the space-separated wire format.
#[ must_use ]
pub fn format_scope_list( scopes: &[ Scope ] ) -> String
{
  scopes.iter().map( Scope::as_str ).collect::< Vec< _ > >().join( " " )
}

/// The method -> required-scope table (§4.2).
#[ must_use ]
pub fn required_scope_for_method( method: &str ) -> Option< Scope >
{
  match method
  {
    "tools/list" | "tools/call" => Some( Scope::Tools ),
    "resources/list" => Some( Scope::Resources ),
    "prompts/list" => Some( Scope::Prompts ),
    _ => None,
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn parses_known_scopes_and_collects_unknown_ones()
  {
    assert_eq!( parse_scope_list( "mcp:tools mcp:resources" ).unwrap(), vec![ Scope::Tools, Scope::Resources ] );

    let err = parse_scope_list( "mcp:tools bogus:one bogus:two" ).unwrap_err();
    assert_eq!( err, vec![ "bogus:one".to_string(), "bogus:two".to_string() ] );
  }

  #[ test ]
  fn round_trips_format_and_parse()
  {
    let scopes = vec![ Scope::Tools, Scope::AgentsRead ];
    let text = format_scope_list( &scopes );
    assert_eq!( parse_scope_list( &text ).unwrap(), scopes );
  }

  #[ test ]
  fn method_scope_table_matches_spec()
  {
    assert_eq!( required_scope_for_method( "tools/call" ), Some( Scope::Tools ) );
    assert_eq!( required_scope_for_method( "ping" ), None );
  }
}
