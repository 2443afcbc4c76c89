// src/server/handlers/admin.rs

//! Admin endpoints: metrics and cache statistics

use crate::error::Result;
use crate::server::SharedState;
use crate::server::response;
use axum::extract::State;
use axum::response::Response;
use serde_json::json;

/// GET /admin/stats
pub async fn stats(State(state): State<SharedState>) -> Result<Response> {
    let guard = state.read().await;
    guard.metrics.record_request();

    let metrics = guard.metrics.snapshot();
    let cache = guard.cache.stats().await;
    Ok(response::ok(json!({
        "metrics": metrics,
        "cache": cache,
    })))
}
