//! §4.4 fuzzy agent selection: `calculateSimilarity` and `selectAgent`.

use std::collections::HashSet;

const AUTO_SELECT_THRESHOLD: f64 = 0.8;
const CONFIRM_THRESHOLD: f64 = 0.5;

/// A single scored candidate, built from `displayName || hostname || "Unnamed Agent"` —
/// callers must never hand a raw id into `name`.
#[ derive( Debug, Clone, PartialEq ) ]
pub struct ScoredAgent
{
  pub db_id: String,
  pub name: String,
  pub score: f64,
}

#[ derive( Debug, Clone, PartialEq ) ]
pub enum SelectionOutcome
{
  AutoSelected { db_id: String, name: String },
  Confirm { db_id: String, name: String, score: f64 },
  Candidates( Vec< ScoredAgent > ),
  NoAgentsOnline,
}

/// Lowercase, strip apostrophes/backtick, replace non-alphanumerics with a
/// space, collapse runs of whitespace.
#[ must_use ]
pub fn normalize( text: &str ) -> String
{
  let cleaned: String = text
    .chars()
    .filter( |c| !matches!( c, '\'' | '\u{2019}' | '`' ) )
    .map( |c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' } )
    .collect();

  cleaned.split_whitespace().collect::< Vec< _ > >().join( " " )
}

/// §4.4 `calculateSimilarity(requested, candidate)`.
#[ must_use ]
pub fn calculate_similarity( requested: &str, candidate_id: &str, candidate_name: &str ) -> f64
{
  if requested == candidate_id
  {
    return 1.0;
  }

  let a = normalize( requested );
  let b = normalize( candidate_name );

  if a == b
  {
    return 1.0;
  }
  if a.is_empty() || b.is_empty()
  {
    return 0.0;
  }

  if a.contains( &b ) || b.contains( &a )
  {
    let ( shorter, longer ) = if a.len() <= b.len() { ( a.len(), b.len() ) } else { ( b.len(), a.len() ) };
    return ( shorter as f64 / longer as f64 ) * 0.9;
  }

  let words_a: HashSet< &str > = a.split( ' ' ).collect();
  let words_b: HashSet< &str > = b.split( ' ' ).collect();
  let matching_words = words_a.intersection( &words_b ).count();
  let max_words = words_a.len().max( words_b.len() );
  if matching_words > 0 && max_words > 0
  {
    return ( matching_words as f64 / max_words as f64 ) * 0.8;
  }

  let chars_a: HashSet< char > = a.chars().filter( |c| *c != ' ' ).collect();
  let chars_b: HashSet< char > = b.chars().filter( |c| *c != ' ' ).collect();
  let matching_chars = chars_a.intersection( &chars_b ).count();
  let max_chars = chars_a.len().max( chars_b.len() );
  if max_chars == 0
  {
    return 0.0;
  }
  ( matching_chars as f64 / max_chars as f64 ) * 0.5
}

/// §4.4 `selectAgent(requested?)`. `candidates` is every online agent owned
/// by the caller, as `(dbId, displayName || hostname || "Unnamed Agent")`.
#[ must_use ]
pub fn select_agent( requested: Option< &str >, candidates: &[ ( String, String ) ] ) -> SelectionOutcome
{
  if candidates.is_empty()
  {
    return SelectionOutcome::NoAgentsOnline;
  }

  let Some( requested ) = requested else
  {
    return if candidates.len() == 1
    {
      SelectionOutcome::AutoSelected { db_id: candidates[ 0 ].0.clone(), name: candidates[ 0 ].1.clone() }
    }
    else
    {
      SelectionOutcome::Candidates(
        candidates.iter().map( |( id, name )| ScoredAgent { db_id: id.clone(), name: name.clone(), score: 0.0 } ).collect()
      )
    };
  };

  let mut scored: Vec< ScoredAgent > = candidates
    .iter()
    .map( |( id, name )| ScoredAgent { db_id: id.clone(), name: name.clone(), score: calculate_similarity( requested, id, name ) } )
    .collect();
  scored.sort_by( |a, b| b.score.partial_cmp( &a.score ).unwrap_or( std::cmp::Ordering::Equal ) );

  let best = scored[ 0 ].clone();
  if best.score >= AUTO_SELECT_THRESHOLD
  {
    SelectionOutcome::AutoSelected { db_id: best.db_id, name: best.name }
  }
  else if best.score >= CONFIRM_THRESHOLD
  {
    SelectionOutcome::Confirm { db_id: best.db_id, name: best.name, score: best.score }
  }
  else
  {
    SelectionOutcome::Candidates( scored )
  }
}

#[ cfg( test ) ]
mod tests
{
  use super::*;

  #[ test ]
  fn exact_id_match_scores_one()
  {
    assert!( ( calculate_similarity( "agent_123", "agent_123", "Something Else" ) - 1.0 ).abs() < f64::EPSILON );
  }

  #[ test ]
  fn normalized_equality_ignores_case_and_punctuation()
  {
    let score = calculate_similarity( "Bob's Laptop", "agent_1", "bobs laptop" );
    assert!( ( score - 1.0 ).abs() < f64::EPSILON );
  }

  #[ test ]
  fn substring_containment_scores_point_nine_scaled()
  {
    let score = calculate_similarity( "laptop", "agent_1", "bobs work laptop" );
    assert!( score > 0.0 && score < 0.9 );
  }

  #[ test ]
  fn word_overlap_falls_in_point_eight_band()
  {
    let score = calculate_similarity( "bob work machine", "agent_1", "bob home machine" );
    assert!( score > 0.0 && score <= 0.8 );
  }

  #[ test ]
  fn single_online_agent_auto_selects_without_a_request()
  {
    let candidates = vec![ ( "agent_1".to_string(), "Bob's Laptop".to_string() ) ];
    assert_eq!(
      select_agent( None, &candidates ),
      SelectionOutcome::AutoSelected { db_id: "agent_1".into(), name: "Bob's Laptop".into() }
    );
  }

  #[ test ]
  fn multiple_online_agents_without_a_request_ask_to_disambiguate()
  {
    let candidates = vec![
      ( "agent_1".to_string(), "Bob's Laptop".to_string() ),
      ( "agent_2".to_string(), "Alice's Desktop".to_string() ),
    ];
    assert!( matches!( select_agent( None, &candidates ), SelectionOutcome::Candidates( _ ) ) );
  }

  #[ test ]
  fn no_online_agents_reports_that_clearly()
  {
    assert_eq!( select_agent( Some( "anything" ), &[] ), SelectionOutcome::NoAgentsOnline );
  }
}
