//! Repository error type.

/// Errors surfaced by repository operations. Kept small and mapped to
/// `relay_types::BrokerError::Internal` (or `NotFound`) at call sites — the
/// repository itself does not know about JSON-RPC or HTTP.
#[ derive( Debug, thiserror::Error ) ]
pub enum RepositoryError
{
  #[ error( "database error: {0}" ) ]
  Database( #[ from ] sqlx::Error ),

  #[ error( "not found: {0}" ) ]
  NotFound( String ),

  #[ error( "conflict: {0}" ) ]
  Conflict( String ),
}

pub type Result< T > = core::result::Result< T, RepositoryError >;
