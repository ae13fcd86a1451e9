//! API route definitions
//!
//! Binds every endpoint of the bridge surface to its handler. The router is
//! CORS-permissive (the editor UI runs on another port) and traces every
//! request.

use crate::api::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Bridge state (projection in / state out)
        .route(
            "/api/bridge/state",
            post(handlers::bridge::post_state).get(handlers::bridge::get_state),
        )
        .route("/api/bridge/layout", post(handlers::bridge::post_layout))
        .route("/api/bridge/health", get(handlers::bridge::health))
        .route(
            "/api/bridge/pending-actions",
            get(handlers::bridge::pending_actions),
        )
        .route(
            "/api/bridge/pending-actions/enqueue",
            post(handlers::bridge::enqueue_actions),
        )
        .route(
            "/api/bridge/action-completed",
            post(handlers::bridge::action_completed),
        )
        .route(
            "/api/bridge/action-feedback",
            post(handlers::bridge::action_feedback),
        )
        .route(
            "/api/bridge/telemetry",
            get(handlers::bridge::telemetry_snapshot),
        )
        .route("/api/bridge/chat", post(handlers::bridge::chat_append))
        // Chat and agent
        .route("/api/ai/chat", post(handlers::agent::chat))
        .route("/api/ai/agent", post(handlers::agent::agent))
        .route("/api/ai/agent/continue", post(handlers::agent::agent_continue))
        // Orchestration queues
        .route("/queue/goals.enqueue", post(handlers::queues::goals_enqueue))
        .route("/queue/tasks.pull", post(handlers::queues::tasks_pull))
        .route("/queue/patches.submit", post(handlers::queues::patches_submit))
        .route("/queue/reviews.pull", post(handlers::queues::reviews_pull))
        .route("/queue/reviews.submit", post(handlers::queues::reviews_submit))
        .route("/queue/patches.approve-next", post(handlers::testing::approve_next))
        .route("/queue/metrics", get(handlers::queues::queue_metrics))
        .route("/queue/peek", get(handlers::queues::queue_peek))
        .route("/commit/apply", post(handlers::queues::commit_apply))
        // Scheduler
        .route(
            "/orchestration/scheduler/start",
            post(handlers::scheduler::start),
        )
        .route(
            "/orchestration/scheduler/stop",
            post(handlers::scheduler::stop),
        )
        .route(
            "/orchestration/scheduler/status",
            get(handlers::scheduler::status),
        )
        // Events & telemetry
        .route("/events/stream", get(handlers::events::events_stream))
        .route("/telemetry", get(handlers::events::telemetry_get))
        .route("/telemetry/stream", get(handlers::events::telemetry_stream))
        // MCP shim
        .route("/api/mcp/request", post(handlers::mcp::request))
        // Search
        .route("/search", get(handlers::search::get))
        // Test helpers
        .route("/test/create-task", post(handlers::testing::create_task))
        .route("/test/commit-ops", post(handlers::testing::commit_ops))
        .route("/test/ai/read-store", get(handlers::testing::read_store))
        .route(
            "/test/ai/roundtrip/add-node",
            post(handlers::testing::roundtrip_add_node),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
