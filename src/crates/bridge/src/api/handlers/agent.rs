//! Chat and agent handlers
//!
//! LLM-bound endpoints. Both require a bearer key; a missing header is a
//! friendly 401 and never queues work.

use crate::api::error::{ApiError, ApiResult};
use crate::router::{AgentRequest, ContinueRequest};
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

fn bearer_key(headers: &HeaderMap) -> ApiResult<String> {
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::Unauthorized(
                "Add your API key in settings so I can reach the model.".to_string(),
            )
        })?;
    let key = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if key.is_empty() {
        return Err(ApiError::Unauthorized(
            "The Authorization header is empty — paste your API key in settings.".to_string(),
        ));
    }
    Ok(key.to_string())
}

/// POST /api/ai/chat — conversational Q&A.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AgentRequest>,
) -> ApiResult<Json<Value>> {
    let api_key = bearer_key(&headers)?;
    let response = state.router.handle_chat(&api_key, request).await?;
    Ok(Json(json!({"response": response})))
}

/// POST /api/ai/agent — intent-routed turn.
pub async fn agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AgentRequest>,
) -> ApiResult<Json<crate::router::AgentResponse>> {
    let api_key = bearer_key(&headers)?;
    let response = state.router.handle_agent(&api_key, request).await?;
    Ok(Json(response))
}

/// POST /api/ai/agent/continue — committer-driven continuation. The key
/// rides in the body (forwarded from patch meta), not the header.
pub async fn agent_continue(
    State(state): State<AppState>,
    Json(request): Json<ContinueRequest>,
) -> ApiResult<Json<Value>> {
    let result = state.router.handle_continue(request).await?;
    Ok(Json(result))
}
