//! §4.9 `compareVersions` and the deterministic rollout hash.

use std::cmp::Ordering;

/// Strip a leading `v`/`V`, split on `.`, take each component's pre-hyphen
/// numeric prefix (missing → 0), compare `[major, minor, patch]` lexically.
#[ must_use ]
pub fn compare_versions( a: &str, b: &str ) -> Ordering
{
  let parsed_a = parse_version( a );
  let parsed_b = parse_version( b );
  parsed_a.cmp( &parsed_b )
}

fn parse_version( raw: &str ) -> [ u64; 3 ]
{
  let trimmed = raw.strip_prefix( 'v' ).or_else( || raw.strip_prefix( 'V' ) ).unwrap_or( raw );
  let mut components = [ 0u64; 3 ];

  for ( index, part ) in trimmed.split( '.' ).take( 3 ).enumerate()
  {
    let numeric_prefix: String = part.split( '-' ).next().unwrap_or( "" )
      .chars()
      .take_while( |c| c.is_ascii_digit() )
      .collect();
    components[ index ] = numeric_prefix.parse().unwrap_or( 0 );
  }

  components
}

/// The classic shift-subtract-accumulate hash (`((h<<5)-h)+c`) over a
/// string's UTF-16 code units, stable across releases for rollout bucketing.
#[ must_use ]
pub fn hash_code( text: &str ) -> i32
{
  let mut hash: i32 = 0;
  for unit in text.encode_utf16()
  {
    hash = hash.wrapping_shl( 5 ).wrapping_sub( hash ).wrapping_add( i32::from( unit ) );
  }
  hash
}

/// Deterministic rollout bucket membership: `|hashCode(machineId)| mod 100 < rolloutPercent`.
#[ must_use ]
pub fn in_rollout_bucket( machine_id: &str, rollout_percent: i64 ) -> bool
{
  let bucket = i64::from( hash_code( machine_id ).unsigned_abs() ) % 100;
  bucket < rollout_percent
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn compares_simple_versions()
  {
    assert_eq!( compare_versions( "1.2.3", "1.2.4" ), Ordering::Less );
    assert_eq!( compare_versions( "2.0.0", "1.9.9" ), Ordering::Greater );
    assert_eq!( compare_versions( "1.0.0", "v1.0.0" ), Ordering::Equal );
  }

  #[ test ]
  fn treats_missing_components_as_zero()
  {
    assert_eq!( compare_versions( "1.2", "1.2.0" ), Ordering::Equal );
  }

  #[ test ]
  fn strips_pre_hyphen_suffixes()
  {
    assert_eq!( compare_versions( "1.2.3-beta.1", "1.2.3" ), Ordering::Equal );
  }

  #[ test ]
  fn hash_code_is_stable()
  {
    assert_eq!( hash_code( "machine-a" ), hash_code( "machine-a" ) );
    assert_ne!( hash_code( "machine-a" ), hash_code( "machine-b" ) );
  }

  #[ test ]
  fn rollout_bucket_is_deterministic()
  {
    let first = in_rollout_bucket( "machine-123", 50 );
    let second = in_rollout_bucket( "machine-123", 50 );
    assert_eq!( first, second );
  }

  #[ test ]
  fn zero_rollout_excludes_everyone()
  {
    assert!( !in_rollout_bucket( "any-machine", 0 ) );
  }

  #[ test ]
  fn full_rollout_includes_everyone()
  {
    assert!( in_rollout_bucket( "any-machine", 100 ) );
  }
}
