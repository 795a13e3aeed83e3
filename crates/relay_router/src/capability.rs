//! §4.4 capability aggregation for `tools/list`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use relay_registry::{ AgentRegistry, ConnectedAgent, ToolsCache };
use relay_repository::Repository;
use relay_types::BrokerError;
use serde_json::{ json, Value };

use crate::command::{ send_command, CommandContext };

/// For every online agent owned by `owner_user_id`, fetch (or reuse the
/// cached) tool catalog and merge by name — later agents win on collision.
/// Falls back to [`built_in_catalog`] when nothing merges.
///
/// # Errors
/// Propagates the first repository failure; a single agent's `tools/list`
/// failing does not abort the aggregation (it just contributes nothing).
pub async fn aggregate_tools( repository: &Repository, registry: &AgentRegistry, owner_user_id: &str ) -> Result< Vec< Value >, BrokerError >
{
  let rows = repository.list_agents_for_user( owner_user_id ).await
    .map_err( |e| BrokerError::Internal( e.to_string() ) )?;

  let mut merged: HashMap< String, Value > = HashMap::new();

  for row in rows.iter().filter( |r| r.status == "ONLINE" )
  {
    let Some( agent ) = registry.get_agent( &row.id ) else { continue };
    if let Ok( tools ) = fetch_tools( repository, &agent ).await
    {
      for tool in tools
      {
        if let Some( name ) = tool.get( "name" ).and_then( Value::as_str )
        {
          merged.insert( name.to_string(), tool );
        }
      }
    }
  }

  if merged.is_empty()
  {
    return Ok( built_in_catalog() );
  }
  Ok( merged.into_values().collect() )
}

async fn fetch_tools( repository: &Repository, agent: &Arc< ConnectedAgent > ) -> Result< Vec< Value >, BrokerError >
{
  {
    let cache = agent.tools.lock().unwrap();
    if let Some( cached ) = &*cache
    {
      return Ok( cached.tools.clone() );
    }
  }

  let result = send_command( repository, agent, "tools/list", json!( {} ), &CommandContext::default() ).await?;
  let tools: Vec< Value > = result.get( "tools" ).and_then( Value::as_array ).cloned().unwrap_or_default();

  *agent.tools.lock().unwrap() = Some( ToolsCache { tools: tools.clone(), fetched_at: Utc::now() } );
  Ok( tools )
}

/// Desktop-control catalog advertised when no online agent contributes any
/// tools of its own (§4.4).
#[ must_use ]
pub fn built_in_catalog() -> Vec< Value >
{
  [
    "desktop_screenshot",
    "mouse_move", "mouse_click", "mouse_scroll", "mouse_drag",
    "keyboard_type", "keyboard_press",
    "window_list", "window_focus", "window_close", "window_resize",
    "app_launch", "app_list", "app_close",
    "clipboard_read", "clipboard_write",
    "file_read", "file_write", "file_list", "file_delete",
    "system_info",
    "screen_find_text", "screen_find_image",
    "list_agents",
    "emergency_stop",
  ]
  .iter()
  .map( |name| json!( { "name": name, "builtin": true } ) )
  .collect()
}
