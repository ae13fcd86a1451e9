//! Id generation and placeholder handling
//!
//! Ids are opaque strings everywhere in the pipeline. The single exception
//! is the `NEW_GRAPH:<name>` placeholder, which an executor may use as a
//! target graph id before the real id exists; the committer resolves it
//! against `createNewGraph` ops in the same batch.

use uuid::Uuid;

/// Prefix marking a graph id that has not been allocated yet.
pub const NEW_GRAPH_PREFIX: &str = "NEW_GRAPH:";

/// Generate a fresh opaque id with a short type prefix, e.g. `graph-6f2a…`.
pub fn fresh_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Build a placeholder graph id for a graph that is about to be created.
pub fn graph_placeholder(name: &str) -> String {
    format!("{}{}", NEW_GRAPH_PREFIX, name)
}

/// True if `id` is an unresolved `NEW_GRAPH:` placeholder.
pub fn is_graph_placeholder(id: &str) -> bool {
    id.starts_with(NEW_GRAPH_PREFIX)
}

/// The graph name carried by a placeholder id, if it is one.
pub fn placeholder_name(id: &str) -> Option<&str> {
    id.strip_prefix(NEW_GRAPH_PREFIX)
}
