//! Activity pattern / quiet-hours detection (§4.3.3). Advisory only — nothing
//! in the scheduler consults this beyond persisting it.

/// Scan the doubled 48-hour array for the longest run of hours below
/// `total/24/4`; if that run is at least 4 hours long, return its
/// `(first, last)` hour-of-day. `None` below the 100-sample threshold or
/// when no run qualifies.
#[ must_use ]
pub fn detect_quiet_hours( hourly: &[ i64; 24 ] ) -> Option< ( u32, u32 ) >
{
  let total: i64 = hourly.iter().sum();
  if total < 100
  {
    return None;
  }

  let threshold = total as f64 / 24.0 / 4.0;
  let doubled: Vec< i64 > = hourly.iter().chain( hourly.iter() ).copied().collect();

  let mut best_start = 0usize;
  let mut best_len = 0usize;
  let mut i = 0usize;
  while i < doubled.len()
  {
    if ( doubled[ i ] as f64 ) < threshold
    {
      let start = i;
      let mut j = i;
      while j < doubled.len() && ( doubled[ j ] as f64 ) < threshold
      {
        j += 1;
      }
      let len = ( j - start ).min( 24 );
      if len > best_len
      {
        best_len = len;
        best_start = start;
      }
      i = j;
    }
    else
    {
      i += 1;
    }
  }

  if best_len >= 4
  {
    let end = best_start + best_len - 1;
    Some( ( ( best_start % 24 ) as u32, ( end % 24 ) as u32 ) )
  }
  else
  {
    None
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn below_hundred_samples_returns_none()
  {
    let mut hourly = [ 5i64; 24 ];
    hourly[ 0 ] = 0;
    assert!( hourly.iter().sum::< i64 >() < 100 );
    assert_eq!( detect_quiet_hours( &hourly ), None );
  }

  #[ test ]
  fn exactly_hundred_is_the_threshold_boundary()
  {
    // 24 * 5 = 120 >= 100; hours 0..3 are zero (well below threshold 1.25)
    let mut hourly = [ 5i64; 24 ];
    hourly[ 0 ] = 0;
    hourly[ 1 ] = 0;
    hourly[ 2 ] = 0;
    hourly[ 3 ] = 0;
    assert_eq!( detect_quiet_hours( &hourly ), Some( ( 0, 3 ) ) );
  }

  #[ test ]
  fn run_wrapping_past_midnight_is_detected()
  {
    let mut hourly = [ 5i64; 24 ];
    hourly[ 22 ] = 0;
    hourly[ 23 ] = 0;
    hourly[ 0 ] = 0;
    hourly[ 1 ] = 0;
    assert_eq!( detect_quiet_hours( &hourly ), Some( ( 22, 1 ) ) );
  }

  #[ test ]
  fn run_shorter_than_four_hours_is_ignored()
  {
    let mut hourly = [ 5i64; 24 ];
    hourly[ 0 ] = 0;
    hourly[ 1 ] = 0;
    assert_eq!( detect_quiet_hours( &hourly ), None );
  }
}
