//! Health Check API Handler

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::config::StoreBackend;
use crate::state::AppState;

/// GET /health
/// Liveness check; also reports which store backend is active
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store = match state.config.store_backend {
        StoreBackend::Postgres => "postgres",
        StoreBackend::Memory => "memory",
    };

    Json(json!({ "status": "ok", "store": store }))
}
