use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::gateway_util::AppState;

/// `GET /api/stats`: directory totals for the landing page.
///
/// Always 200: on a listing failure the counts are zero and an `error` field explains why.
pub async fn stats_handler(State(app_state): AppState) -> Json<Value> {
    match app_state.listing.directory_stats().await {
        Ok(stats) => Json(json!({
            "agencies": stats.agencies,
            "contacts": stats.contacts,
            "states": stats.states,
        })),
        Err(e) => {
            tracing::warn!("Directory stats unavailable: {e}");
            Json(json!({
                "agencies": 0,
                "contacts": 0,
                "states": 0,
                "error": "Directory unavailable",
            }))
        }
    }
}
