//! Shared data model for the graphbridge orchestration core
//!
//! This crate defines the wire-facing types exchanged between the UI
//! projection, the orchestration pipeline, and the HTTP surface: mutation
//! ops, patches and reviews, goals and tasks, pending actions, and the
//! projected store snapshot. All types serialize with camelCase field names
//! to match the canonical wire format.

pub mod action;
pub mod goal;
pub mod ids;
pub mod op;
pub mod patch;
pub mod store;

pub use action::{ActionKind, ActionMeta, PendingAction};
pub use goal::{Goal, GoalKind, Task, TaskSpec, ToolName};
pub use ids::{fresh_id, graph_placeholder, is_graph_placeholder, placeholder_name};
pub use op::{Directionality, EdgeInit, GraphInit, Op, Position, PrototypeInit};
pub use patch::{Patch, PatchMeta, Review, ReviewStatus};
pub use store::{
    GraphSnapshot, InstanceSnapshot, ProjectedStore, PrototypeSnapshot, StoreSummary,
};

/// Current epoch time in milliseconds, the timestamp unit used on the wire.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
