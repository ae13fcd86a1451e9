//! Search handler

use crate::api::error::{ApiError, ApiResult};
use crate::search::{search, SearchOptions, SearchScope};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchQuery {
    q: Option<String>,
    scope: Option<SearchScope>,
    graph_id: Option<String>,
    limit: Option<usize>,
    regex: Option<bool>,
    fuzzy: Option<bool>,
    case_sensitive: Option<bool>,
}

/// GET /search?q=…&scope=…
pub async fn get(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let q = query
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("q is required".to_string()))?;

    let options = SearchOptions {
        scope: query.scope.unwrap_or_default(),
        graph_id: query.graph_id,
        limit: query.limit.unwrap_or(50),
        regex: query.regex.unwrap_or(false),
        fuzzy: query.fuzzy.unwrap_or(false),
        case_sensitive: query.case_sensitive.unwrap_or(false),
    };

    // An empty projected store answers safely, never 5xx.
    let Some(store) = state.store.snapshot() else {
        return Ok(Json(json!({"ok": true, "count": 0, "results": []})));
    };

    let results = search(&store, &q, &options)
        .map_err(|e| ApiError::BadRequest(format!("invalid regex: {}", e)))?;
    Ok(Json(json!({"ok": true, "count": results.len(), "results": results})))
}
