use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::gateway_util::AppState;

pub const DIRECTORY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liveness plus the quota counters accumulated since startup
pub async fn status_handler(State(app_state): AppState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": DIRECTORY_VERSION,
        "quota": {
            "dailyLimit": app_state.quota.daily_limit(),
            "metrics": app_state.quota.metrics().snapshot(),
        },
    }))
}

/// The gateway keeps no connections that must be up to serve traffic: a quota store
/// outage surfaces per request as `StoreUnavailable`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "gateway": "ok" }))
}
