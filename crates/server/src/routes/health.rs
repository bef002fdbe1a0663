//! Health endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /` — service banner.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "lead-qualification",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /health-check` — store connectivity plus live session counts.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store_ok = state.db.ping().await;

    Json(json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "store": store_ok,
        "open_sessions": state.hub.session_count().await,
        "in_flight_conversations": state.router.active_count().await,
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}
