//! Scheduler control handlers

use crate::scheduler::StartOptions;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// POST /orchestration/scheduler/start
pub async fn start(
    State(state): State<AppState>,
    Json(options): Json<StartOptions>,
) -> Json<Value> {
    state.scheduler.start(options);
    Json(json!({"ok": true, "status": state.scheduler.status()}))
}

/// POST /orchestration/scheduler/stop
pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.scheduler.stop();
    Json(json!({"ok": true, "status": state.scheduler.status()}))
}

/// GET /orchestration/scheduler/status
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"ok": true, "status": state.scheduler.status()}))
}
