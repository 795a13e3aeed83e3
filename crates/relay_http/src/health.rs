//! Liveness endpoint (SPEC_FULL supplemented feature 4).

use axum::http::StatusCode;
use axum::response::{ IntoResponse, Json };
use chrono::Utc;
use serde::Serialize;

#[ derive( Debug, Serialize ) ]
pub struct HealthResponse
{
  pub status: String,
  pub timestamp: i64,
}

/// GET /health — liveness only, no external dependency checked.
#[ must_use ]
pub async fn health_check() -> impl IntoResponse
{
  ( StatusCode::OK, Json( HealthResponse { status: "healthy".to_string(), timestamp: Utc::now().timestamp() } ) )
}
