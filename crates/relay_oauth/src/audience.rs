//! Audience normalization and endpoint-uuid extraction (§4.1, §4.6 `resource`).

/// `normalize(a) = strip trailing '/'` (§4.1).
#[ must_use ]
pub fn normalize( audience: &str ) -> String
{
  audience.trim_end_matches( '/' ).to_string()
}

/// Pulls the `{uuid}` segment out of `app_url + "/mcp/" + uuid`. Returns `None`
/// if `resource` doesn't live under this broker's tenant-endpoint namespace.
#[ must_use ]
pub fn extract_endpoint_uuid( app_url: &str, resource: &str ) -> Option< String >
{
  let base = format!( "{}/mcp/", normalize( app_url ) );
  let normalized = normalize( resource );
  normalized.strip_prefix( base.as_str() ).map( str::to_string ).filter( |s| !s.is_empty() )
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn strips_trailing_slash()
  {
    assert_eq!( normalize( "https://host/mcp/abc/" ), "https://host/mcp/abc" );
    assert_eq!( normalize( "https://host/mcp/abc" ), "https://host/mcp/abc" );
  }

  #[ test ]
  fn extracts_uuid_from_matching_resource()
  {
    assert_eq!(
      extract_endpoint_uuid( "https://host", "https://host/mcp/abc-123" ),
      Some( "abc-123".to_string() )
    );
  }

  #[ test ]
  fn rejects_resource_under_a_different_host()
  {
    assert_eq!( extract_endpoint_uuid( "https://host", "https://other/mcp/abc-123" ), None );
  }
}
