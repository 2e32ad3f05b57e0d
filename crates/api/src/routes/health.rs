use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint. No auth required.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let (engine, cycle) = {
        let snapshot = state.snapshot.borrow();
        (snapshot.engine_state, snapshot.cycle)
    };
    Json(json!({
        "status": "ok",
        "engine": engine.to_string(),
        "cycle": cycle,
    }))
}
