//! Bridge state and pending-action handlers
//!
//! The projection surface: the UI pushes snapshots and layout updates in,
//! leases pending actions out, and acks them back.

use crate::api::error::{ApiError, ApiResult};
use crate::chat::post_chat;
use crate::state::AppState;
use crate::store::LayoutMode;
use crate::telemetry::TelemetryKind;
use axum::extract::State;
use axum::Json;
use graphmodel::{ActionKind, PendingAction, ProjectedStore};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// POST /api/bridge/state
pub async fn post_state(
    State(state): State<AppState>,
    Json(store): Json<ProjectedStore>,
) -> impl axum::response::IntoResponse {
    state.telemetry.record(
        TelemetryKind::BridgeState,
        None,
        json!({
            "graphs": store.graphs.len(),
            "prototypes": store.node_prototypes.len(),
            "activeGraphId": store.active_graph_id,
        }),
    );
    state.store.replace(store);
    Json(json!({"ok": true}))
}

/// GET /api/bridge/state
pub async fn get_state(State(state): State<AppState>) -> Json<Value> {
    match state.store.snapshot() {
        Some(store) => Json(serde_json::to_value(store).unwrap_or(Value::Null)),
        None => Json(Value::Null),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
    layouts: HashMap<String, Value>,
    #[serde(default = "default_mode")]
    mode: LayoutMode,
}

fn default_mode() -> LayoutMode {
    LayoutMode::Merge
}

/// POST /api/bridge/layout
pub async fn post_layout(
    State(state): State<AppState>,
    Json(request): Json<LayoutRequest>,
) -> Json<Value> {
    state.store.apply_layouts(request.layouts, request.mode);
    Json(json!({"ok": true}))
}

/// GET /api/bridge/health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"ok": true, "hasStore": state.store.has_store()}))
}

/// GET /api/bridge/pending-actions — lease-on-GET.
pub async fn pending_actions(State(state): State<AppState>) -> Json<Value> {
    let actions = state.outbox.lease();
    Json(json!({"ok": true, "actions": actions}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCompletedRequest {
    action_id: Option<String>,
}

/// POST /api/bridge/action-completed — ack by id.
pub async fn action_completed(
    State(state): State<AppState>,
    Json(request): Json<ActionCompletedRequest>,
) -> ApiResult<Json<Value>> {
    let action_id = request
        .action_id
        .ok_or_else(|| ApiError::BadRequest("actionId is required".to_string()))?;
    let removed = state.outbox.ack(&action_id);
    Ok(Json(json!({"ok": true, "removed": removed})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFeedbackRequest {
    action: Option<String>,
    status: Option<String>,
    error: Option<String>,
    #[serde(default)]
    params: Value,
}

/// POST /api/bridge/action-feedback — record failure without removing.
pub async fn action_feedback(
    State(state): State<AppState>,
    Json(request): Json<ActionFeedbackRequest>,
) -> ApiResult<Json<Value>> {
    let action = request
        .action
        .ok_or_else(|| ApiError::BadRequest("action is required".to_string()))?;
    state.outbox.feedback(
        &action,
        request.status.as_deref().unwrap_or("error"),
        request.error.as_deref(),
        request.params,
    );
    Ok(Json(json!({"ok": true})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueActionsRequest {
    actions: Option<Vec<IncomingAction>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingAction {
    action: ActionKind,
    #[serde(default)]
    params: Vec<Value>,
    #[serde(default)]
    meta: Option<graphmodel::ActionMeta>,
}

/// POST /api/bridge/pending-actions/enqueue — server-side enqueue used by
/// the committer and drainer when they run out-of-process.
pub async fn enqueue_actions(
    State(state): State<AppState>,
    Json(request): Json<EnqueueActionsRequest>,
) -> ApiResult<Json<Value>> {
    let incoming = request
        .actions
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::BadRequest("actions[] is required".to_string()))?;
    let actions: Vec<PendingAction> = incoming
        .into_iter()
        .map(|a| {
            let mut action = PendingAction::new(a.action, a.params);
            action.meta = a.meta;
            action
        })
        .collect();
    let ids = state.outbox.enqueue_bundle(actions);
    Ok(Json(json!({"ok": true, "ids": ids})))
}

/// GET /api/bridge/telemetry — combined telemetry + chat snapshot.
pub async fn telemetry_snapshot(State(state): State<AppState>) -> Json<Value> {
    let telemetry = state.telemetry.query(&Default::default());
    let chat = state.chat.snapshot();
    Json(json!({"telemetry": telemetry, "chat": chat}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAppendRequest {
    #[serde(default = "default_role")]
    role: String,
    text: Option<String>,
    cid: Option<String>,
}

fn default_role() -> String {
    "assistant".to_string()
}

/// POST /api/bridge/chat — append one chat line.
pub async fn chat_append(
    State(state): State<AppState>,
    Json(request): Json<ChatAppendRequest>,
) -> ApiResult<Json<Value>> {
    let text = request
        .text
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("text is required".to_string()))?;
    post_chat(
        &state.chat,
        &state.events,
        &state.telemetry,
        &request.role,
        &text,
        request.cid,
    );
    Ok(Json(json!({"ok": true})))
}
