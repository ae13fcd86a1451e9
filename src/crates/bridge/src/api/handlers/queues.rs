//! Queue surface handlers
//!
//! The orchestration pipeline's HTTP face: goals in, tasks and reviews
//! pulled by out-of-process workers, patches and decisions submitted back.

use crate::api::error::{ApiError, ApiResult};
use crate::events::EventKind;
use crate::queue::{names, PullOptions};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use graphmodel::{Goal, GoalKind, Patch, Review, ReviewStatus, TaskSpec};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalEnqueueRequest {
    goal: Option<GoalKind>,
    #[serde(default)]
    dag: Vec<TaskSpec>,
    thread_id: Option<String>,
}

/// POST /queue/goals.enqueue
pub async fn goals_enqueue(
    State(state): State<AppState>,
    Json(request): Json<GoalEnqueueRequest>,
) -> ApiResult<Json<Value>> {
    let kind = request
        .goal
        .ok_or_else(|| ApiError::BadRequest("goal is required".to_string()))?;
    let thread_id = request
        .thread_id
        .unwrap_or_else(|| graphmodel::fresh_id("thread"));
    let goal = Goal::new(kind, request.dag, thread_id);

    let payload =
        serde_json::to_value(&goal).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .queues
        .enqueue(names::GOALS, payload, Some(goal.thread_id.clone()));
    state.events.append(
        EventKind::GoalEnqueued,
        json!({"goalId": goal.id, "goal": goal.goal, "threadId": goal.thread_id}),
    );
    Ok(Json(json!({"ok": true, "id": goal.id})))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TasksPullRequest {
    thread_id: Option<String>,
    max: Option<usize>,
}

/// POST /queue/tasks.pull
pub async fn tasks_pull(
    State(state): State<AppState>,
    Json(request): Json<TasksPullRequest>,
) -> Json<Value> {
    let options = PullOptions {
        partition_key: request.thread_id,
        max: request.max.unwrap_or(10),
    };
    let items = state.queues.pull(names::TASKS, &options, None);
    Json(json!({"ok": true, "items": items}))
}

#[derive(Deserialize)]
pub struct PatchSubmitRequest {
    patch: Option<Patch>,
}

/// POST /queue/patches.submit
pub async fn patches_submit(
    State(state): State<AppState>,
    Json(request): Json<PatchSubmitRequest>,
) -> ApiResult<Json<Value>> {
    let patch = request
        .patch
        .ok_or_else(|| ApiError::BadRequest("patch is required".to_string()))?;
    if patch.graph_id.is_empty() {
        return Err(ApiError::BadRequest("patch.graphId is required".to_string()));
    }
    let patch_id = patch.patch_id.clone();
    let payload =
        serde_json::to_value(&patch).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .queues
        .enqueue(names::PATCHES, payload, patch.thread_id.clone());
    state.events.append(
        EventKind::PatchSubmitted,
        json!({"patchId": patch_id, "graphId": patch.graph_id, "opsCount": patch.ops.len()}),
    );
    Ok(Json(json!({"ok": true, "patchId": patch_id})))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewsPullRequest {
    max: Option<usize>,
}

/// POST /queue/reviews.pull
pub async fn reviews_pull(
    State(state): State<AppState>,
    Json(request): Json<ReviewsPullRequest>,
) -> Json<Value> {
    let options = PullOptions::max(request.max.unwrap_or(10));
    let items = state.queues.pull(names::REVIEWS, &options, None);
    Json(json!({"ok": true, "items": items}))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmitRequest {
    lease_id: Option<String>,
    decision: Option<String>,
    reasons: Option<Vec<String>>,
    graph_id: Option<String>,
    patch: Option<Patch>,
    patches: Option<Vec<Patch>>,
}

/// POST /queue/reviews.submit
pub async fn reviews_submit(
    State(state): State<AppState>,
    Json(request): Json<ReviewSubmitRequest>,
) -> ApiResult<Json<Value>> {
    let graph_id = request
        .graph_id
        .ok_or_else(|| ApiError::BadRequest("graphId is required".to_string()))?;
    let status = match request.decision.as_deref() {
        Some("approved") => ReviewStatus::Approved,
        Some("rejected") => ReviewStatus::Rejected,
        other => {
            return Err(ApiError::BadRequest(format!(
                "decision must be \"approved\" or \"rejected\", got {:?}",
                other
            )))
        }
    };

    // The lease names the patch-queue item this decision covers.
    if let Some(lease_id) = &request.lease_id {
        state.queues.ack(names::PATCHES, lease_id);
    }

    let review = Review {
        lease_id: request.lease_id,
        review_status: Some(status),
        reasons: request.reasons,
        graph_id: graph_id.clone(),
        patch: request.patch,
        patches: request.patches,
    };
    let payload =
        serde_json::to_value(&review).map_err(|e| ApiError::Internal(e.to_string()))?;
    state
        .queues
        .enqueue(names::REVIEWS, payload, Some(graph_id.clone()));
    state.events.append(
        EventKind::ReviewEnqueued,
        json!({"graphId": graph_id, "reviewStatus": status}),
    );
    Ok(Json(json!({"ok": true})))
}

/// POST /commit/apply — no-op ack; the committer loop is continuous.
pub async fn commit_apply() -> Json<Value> {
    Json(json!({"ok": true, "note": "committer runs continuously"}))
}

#[derive(Deserialize)]
pub struct MetricsQuery {
    name: Option<String>,
}

/// GET /queue/metrics?name=…
pub async fn queue_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<Value>> {
    let name = query
        .name
        .ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;
    let metrics = state.queues.metrics(&name);
    Ok(Json(json!({"ok": true, "name": name, "metrics": metrics})))
}

#[derive(Deserialize)]
pub struct PeekQuery {
    name: Option<String>,
    head: Option<usize>,
}

/// GET /queue/peek?name=…&head=N
pub async fn queue_peek(
    State(state): State<AppState>,
    Query(query): Query<PeekQuery>,
) -> ApiResult<Json<Value>> {
    let name = query
        .name
        .ok_or_else(|| ApiError::BadRequest("name is required".to_string()))?;
    let items = state.queues.peek(&name, query.head.unwrap_or(10));
    Ok(Json(json!({"ok": true, "name": name, "items": items})))
}
