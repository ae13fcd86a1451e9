//! MCP compatibility shim
//!
//! JSON-RPC 2.0 over `POST /api/mcp/request`, advertising the read-only
//! tools (`verify_state`, `list_available_graphs`, `search_nodes`). The
//! dispatch is a small method/tool match; unknown names answer -32601,
//! missing arguments -32602, and anything else -32000.

use crate::executor;
use crate::search::{search, SearchOptions};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

const PROTOCOL_VERSION: &str = "2024-11-05";

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

#[derive(Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

fn rpc_result(id: &Value, result: Value) -> Json<Value> {
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

fn rpc_error(id: &Value, code: i64, message: impl Into<String>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message.into()},
    }))
}

fn tool_listing() -> Value {
    json!([
        {
            "name": "verify_state",
            "description": "Summarize the current graph world: counts, active graph, open graphs.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "list_available_graphs",
            "description": "List every graph with its id, name, and instance count.",
            "inputSchema": {"type": "object", "properties": {}},
        },
        {
            "name": "search_nodes",
            "description": "Score graphs, prototypes, and instances against a query string.",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            },
        },
    ])
}

/// POST /api/mcp/request
pub async fn request(
    State(state): State<AppState>,
    Json(rpc): Json<RpcRequest>,
) -> Json<Value> {
    let id = rpc.id.clone();
    let Some(method) = rpc.method.as_deref() else {
        return rpc_error(&id, METHOD_NOT_FOUND, "method is required");
    };

    match method {
        "initialize" => rpc_result(
            &id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {"name": "graphbridge", "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {"tools": {}},
            }),
        ),
        "tools/list" => rpc_result(&id, json!({"tools": tool_listing()})),
        "tools/call" => {
            let Some(tool) = rpc.params.get("name").and_then(|n| n.as_str()) else {
                return rpc_error(&id, INVALID_PARAMS, "params.name is required");
            };
            let arguments = rpc.params.get("arguments").cloned().unwrap_or(json!({}));
            match call_tool(&state, tool, &arguments) {
                Ok(result) => rpc_result(
                    &id,
                    json!({"content": [{"type": "text", "text": result.to_string()}]}),
                ),
                Err(RpcFailure { code, message }) => rpc_error(&id, code, message),
            }
        }
        other => rpc_error(&id, METHOD_NOT_FOUND, format!("unknown method: {}", other)),
    }
}

struct RpcFailure {
    code: i64,
    message: String,
}

fn call_tool(state: &AppState, tool: &str, arguments: &Value) -> Result<Value, RpcFailure> {
    let snapshot = state.store.snapshot();
    match tool {
        "verify_state" => Ok(executor::verify_state(snapshot.as_ref())),
        "list_available_graphs" => Ok(executor::list_graphs(snapshot.as_ref())),
        "search_nodes" => {
            let query = arguments
                .get("query")
                .and_then(|q| q.as_str())
                .filter(|q| !q.is_empty())
                .ok_or_else(|| RpcFailure {
                    code: INVALID_PARAMS,
                    message: "arguments.query is required".to_string(),
                })?;
            let Some(store) = snapshot else {
                return Ok(json!({"count": 0, "results": []}));
            };
            let results = search(&store, query, &SearchOptions::default()).map_err(|e| {
                RpcFailure {
                    code: SERVER_ERROR,
                    message: e.to_string(),
                }
            })?;
            Ok(json!({"count": results.len(), "results": results}))
        }
        other => Err(RpcFailure {
            code: METHOD_NOT_FOUND,
            message: format!("unknown tool: {}", other),
        }),
    }
}
