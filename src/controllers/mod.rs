pub mod seats;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(seats::routes())
}

// GET /health
async fn health(State(state): State<Arc<crate::AppState>>) -> Json<serde_json::Value> {
    let database = if state.store.is_connected().await { "connected" } else { "disconnected" };
    Json(json!({
        "status": "ok",
        "service": "seat-inventory",
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
