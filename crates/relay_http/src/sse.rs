//! §4.7 step 7 — the `GET /mcp/{uuid}` SSE stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{ Event, KeepAlive, Sse };
use futures_util::stream::{ self, Stream };
use serde_json::json;

const PING_INTERVAL: Duration = Duration::from_secs( 30 );

/// One `notifications/initialized` frame, then a `: ping` comment every 30s
/// until the client disconnects. `axum` drops the stream (and this task's
/// interval) the moment the connection closes, so there's nothing else here
/// to clean up on cancellation.
#[ must_use ]
pub fn stream() -> Sse< impl Stream< Item = Result< Event, Infallible > > >
{
  let initial = Event::default().json_data( json!( {
    "jsonrpc": "2.0",
    "method": "notifications/initialized",
    "params": {},
  } ) ).unwrap_or_else( |_| Event::default().data( "{}" ) );

  let events = stream::once( async move { Ok( initial ) } );

  Sse::new( events ).keep_alive(
    KeepAlive::new().interval( PING_INTERVAL ).text( "ping" )
  )
}
