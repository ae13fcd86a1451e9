//! Test helper endpoints
//!
//! Acceptance tests drive the pipeline through these without a planner or
//! UI in the loop.

use crate::api::error::{ApiError, ApiResult};
use crate::events::EventKind;
use crate::queue::{names, PullOptions};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use graphmodel::{fresh_id, Op, Patch, PendingAction, Review, Task, ToolName};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateTaskRequest {
    tool_name: Option<ToolName>,
    args: Value,
    thread_id: Option<String>,
}

/// POST /test/create-task — enqueue one task directly.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Json<Value>> {
    let task = Task {
        id: fresh_id("task"),
        thread_id: request
            .thread_id
            .unwrap_or_else(|| fresh_id("thread")),
        tool_name: request.tool_name.unwrap_or(ToolName::VerifyState),
        args: request.args,
        depends_on: Vec::new(),
        cid: None,
    };
    let payload = serde_json::to_value(&task).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .queues
        .enqueue(names::TASKS, payload, Some(task.thread_id.clone()));
    state.events.append(
        EventKind::TaskEnqueued,
        json!({"taskId": task.id, "toolName": task.tool_name, "threadId": task.thread_id}),
    );
    Ok(Json(json!({"ok": true, "id": task.id})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOpsRequest {
    graph_id: Option<String>,
    #[serde(default)]
    ops: Vec<Op>,
}

/// POST /test/commit-ops — wrap ops in an approved review for the committer.
pub async fn commit_ops(
    State(state): State<AppState>,
    Json(request): Json<CommitOpsRequest>,
) -> ApiResult<Json<Value>> {
    let graph_id = request
        .graph_id
        .ok_or_else(|| ApiError::BadRequest("graphId is required".to_string()))?;
    let patch = Patch::new(graph_id.clone(), request.ops);
    let patch_id = patch.patch_id.clone();
    let review = Review::approved(patch);
    let payload =
        serde_json::to_value(&review).map_err(|e| ApiError::Internal(e.to_string()))?;
    state.queues.enqueue(names::REVIEWS, payload, Some(graph_id));
    Ok(Json(json!({"ok": true, "patchId": patch_id})))
}

/// POST /queue/patches.approve-next — approve the oldest pending patch.
pub async fn approve_next(State(state): State<AppState>) -> Json<Value> {
    let items = state
        .queues
        .pull(names::PATCHES, &PullOptions::max(1), None);
    let Some(item) = items.into_iter().next() else {
        return Json(json!({"ok": true, "approved": Value::Null}));
    };
    let lease = item.lease_id.clone().unwrap_or_default();

    match serde_json::from_value::<Patch>(item.payload.clone()) {
        Ok(patch) => {
            let patch_id = patch.patch_id.clone();
            let review = Review::approved(patch);
            if let Ok(payload) = serde_json::to_value(&review) {
                state
                    .queues
                    .enqueue(names::REVIEWS, payload, Some(review.graph_id.clone()));
                state.events.append(
                    EventKind::ReviewEnqueued,
                    json!({"patchId": patch_id, "graphId": review.graph_id, "reviewStatus": "approved"}),
                );
            }
            state.queues.ack(names::PATCHES, &lease);
            Json(json!({"ok": true, "approved": patch_id}))
        }
        Err(e) => {
            state.queues.ack(names::PATCHES, &lease);
            Json(json!({"ok": false, "error": e.to_string()}))
        }
    }
}

/// GET /test/ai/read-store — compact store summary.
pub async fn read_store(State(state): State<AppState>) -> Json<Value> {
    match state.store.snapshot() {
        Some(store) => Json(json!({
            "ok": true,
            "hasStore": true,
            "graphs": store.graphs.len(),
            "prototypes": store.node_prototypes.len(),
            "activeGraphId": store.active_graph_id,
            "openGraphIds": store.open_graph_ids,
        })),
        None => Json(json!({"ok": true, "hasStore": false})),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundtripAddNodeRequest {
    name: Option<String>,
    graph_id: Option<String>,
}

/// POST /test/ai/roundtrip/add-node — enqueue a prototype+instance pair
/// straight to the outbox.
pub async fn roundtrip_add_node(
    State(state): State<AppState>,
    Json(request): Json<RoundtripAddNodeRequest>,
) -> ApiResult<Json<Value>> {
    let snapshot = state.store.snapshot();
    let graph_id = request
        .graph_id
        .or_else(|| snapshot.as_ref().and_then(|s| s.active_graph_id.clone()))
        .ok_or_else(|| ApiError::BadRequest("graphId is required when no graph is active".to_string()))?;
    let name = request.name.unwrap_or_else(|| "Test Node".to_string());

    let prototype_id = fresh_id("proto");
    let ops = vec![
        Op::AddNodePrototype {
            prototype_data: graphmodel::PrototypeInit::new(prototype_id.clone(), name)
                .with_color("#5B6CFF"),
        },
        Op::AddNodeInstance {
            graph_id: graph_id.clone(),
            prototype_id,
            position: graphmodel::Position::new(520.0, 320.0),
            instance_id: fresh_id("inst"),
        },
    ];
    let ids = state
        .outbox
        .enqueue_bundle(vec![PendingAction::apply_mutations(ops)]);
    Ok(Json(json!({"ok": true, "actionIds": ids, "graphId": graph_id})))
}
