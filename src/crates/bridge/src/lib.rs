//! Agent orchestration core and HTTP bridge for the graph editor UI
//!
//! The bridge owns the server side of the editing pipeline: a conversational
//! agent proposes graph mutations, which are planned, executed, reviewed, and
//! committed against the UI's projected store with single-writer semantics,
//! idempotence, and ordered delivery. Everything is in-memory; durability
//! across restarts is explicitly out of scope.
//!
//! Components, leaves first: the append-only [`events::EventLog`], the
//! leased [`queue::QueueManager`], the [`outbox::ActionOutbox`] feeding the
//! UI, the single-writer [`committer::Committer`], the cooperative
//! [`scheduler::Scheduler`], the [`router`] that turns chat into goals, the
//! [`api`] surface, the [`search`] index, the [`drainer::SafetyDrainer`],
//! and the [`telemetry::TelemetryRing`].

pub mod api;
pub mod chat;
pub mod committer;
pub mod config;
pub mod drainer;
pub mod events;
pub mod executor;
pub mod outbox;
pub mod queue;
pub mod router;
pub mod scheduler;
pub mod search;
pub mod state;
pub mod store;
pub mod telemetry;

use thiserror::Error;

/// Errors raised inside the orchestration core.
///
/// Ticker loops swallow these (log and retry next tick); HTTP handlers map
/// them to 4xx/5xx via [`api::error::ApiError`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required field was missing or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A `NEW_GRAPH:` placeholder could not be resolved inside its batch.
    #[error("Unresolved graph placeholder: {0}")]
    UnresolvedPlaceholder(String),

    /// Merge check failed for a patch group.
    #[error("Merge conflict on graph {0}")]
    MergeConflict(String),

    /// Upstream LLM failure, status and body preserved.
    #[error(transparent)]
    Llm(#[from] llm::LlmError),

    /// Outbound HTTP failure (loopback continuation, chat append).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error.
    #[error("{0}")]
    General(String),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
