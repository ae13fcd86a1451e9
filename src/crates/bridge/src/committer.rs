//! Single-writer committer
//!
//! A periodic loop that pulls reviewed patches, coalesces them per graph,
//! and emits ordered mutation batches to the pending-action outbox. The
//! loop pulls *without* a queue filter and inspects `reviewStatus` itself:
//! a review that lost the field in transit is still consumed (treated as
//! not approved) instead of parked forever.
//!
//! Exactly one commit runs per graph at any instant. Across graphs the loop
//! is free to interleave, but it stays single-task to keep the invariants
//! simple.

use crate::chat::{post_chat, ChatLog};
use crate::events::{EventKind, EventLog};
use crate::outbox::ActionOutbox;
use crate::queue::{names, QueueManager};
use crate::store::StoreHandle;
use crate::telemetry::{TelemetryKind, TelemetryRing};
use async_trait::async_trait;
use dashmap::DashMap;
use graphmodel::{is_graph_placeholder, Op, Patch, PendingAction, ProjectedStore, Review};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bounded set of applied patch ids, shared between the committer and the
/// safety drainer so double-apply is impossible whichever path wins.
pub struct AppliedSet {
    inner: Mutex<(HashSet<String>, VecDeque<String>)>,
    cap: usize,
}

impl AppliedSet {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new((HashSet::new(), VecDeque::new())),
            cap,
        }
    }

    /// Record an id; returns false if it was already present.
    pub fn insert(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.0.insert(id.to_string()) {
            return false;
        }
        inner.1.push_back(id.to_string());
        while inner.1.len() > self.cap {
            if let Some(old) = inner.1.pop_front() {
                inner.0.remove(&old);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().0.contains(id)
    }
}

/// Merge-check seam invoked for every unseen patch carrying a `baseHash`.
pub trait MergeCheck: Send + Sync {
    fn can_merge(&self, patch: &Patch, store: Option<&ProjectedStore>) -> bool;
}

/// The minimal correct policy: accept unconditionally. The seam still runs
/// so a hash-comparing implementation can be slotted in.
pub struct AcceptAll;

impl MergeCheck for AcceptAll {
    fn can_merge(&self, _patch: &Patch, _store: Option<&ProjectedStore>) -> bool {
        true
    }
}

/// Outbound hooks the committer fires after a commit: the agent
/// continuation endpoint that enables read → reason → act chains.
#[async_trait]
pub trait AgentHooks: Send + Sync {
    async fn continue_agent(&self, payload: Value);
}

/// No-op hooks for tests and headless runs.
pub struct NoopHooks;

#[async_trait]
impl AgentHooks for NoopHooks {
    async fn continue_agent(&self, _payload: Value) {}
}

/// Production hooks: POST to the loopback continuation endpoint.
pub struct HttpAgentHooks {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentHooks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AgentHooks for HttpAgentHooks {
    async fn continue_agent(&self, payload: Value) {
        let url = format!("{}/api/ai/agent/continue", self.base_url);
        if let Err(e) = self.client.post(&url).json(&payload).send().await {
            tracing::warn!(error = %e, "agent continuation POST failed");
        }
    }
}

struct GraphLockGuard<'a> {
    locks: &'a DashMap<String, ()>,
    key: String,
}

impl Drop for GraphLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.remove(&self.key);
    }
}

/// The single-writer commit loop.
pub struct Committer {
    queues: Arc<QueueManager>,
    outbox: Arc<ActionOutbox>,
    events: Arc<EventLog>,
    telemetry: Arc<TelemetryRing>,
    chat: Arc<ChatLog>,
    store: Arc<StoreHandle>,
    merge: Arc<dyn MergeCheck>,
    hooks: Arc<dyn AgentHooks>,
    applied: Arc<AppliedSet>,
    locks: DashMap<String, ()>,
    enabled: AtomicBool,
    window: Duration,
    max: usize,
}

impl Committer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queues: Arc<QueueManager>,
        outbox: Arc<ActionOutbox>,
        events: Arc<EventLog>,
        telemetry: Arc<TelemetryRing>,
        chat: Arc<ChatLog>,
        store: Arc<StoreHandle>,
        applied: Arc<AppliedSet>,
        window: Duration,
        max: usize,
    ) -> Self {
        Self {
            queues,
            outbox,
            events,
            telemetry,
            chat,
            store,
            merge: Arc::new(AcceptAll),
            hooks: Arc::new(NoopHooks),
            applied,
            locks: DashMap::new(),
            enabled: AtomicBool::new(true),
            window,
            max,
        }
    }

    pub fn with_merge_check(mut self, merge: Arc<dyn MergeCheck>) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn AgentHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Pause or resume the loop (the safety drainer covers a paused loop).
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn applied_set(&self) -> Arc<AppliedSet> {
        Arc::clone(&self.applied)
    }

    /// One commit tick: batched unfiltered pull, group by graph, commit each
    /// group under its per-graph lock.
    pub async fn tick(&self) {
        if !self.is_enabled() {
            return;
        }
        let items = self
            .queues
            .pull_batch(names::REVIEWS, self.window, self.max, None)
            .await;
        if items.is_empty() {
            return;
        }

        // Group by graph id, preserving pull order within and across groups.
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<(String, Review)>> = HashMap::new();
        for item in items {
            let lease = item.lease_id.clone().unwrap_or_default();
            match serde_json::from_value::<Review>(item.payload.clone()) {
                Ok(review) => {
                    let key = review.graph_id.clone();
                    if !groups.contains_key(&key) {
                        order.push(key.clone());
                    }
                    groups.entry(key).or_default().push((lease, review));
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "acking unparseable review");
                    self.queues.ack(names::REVIEWS, &lease);
                }
            }
        }

        for graph_id in order {
            if let Some(entries) = groups.remove(&graph_id) {
                self.commit_group(&graph_id, entries).await;
            }
        }
    }

    fn try_lock(&self, graph_id: &str) -> Option<GraphLockGuard<'_>> {
        match self.locks.entry(graph_id.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Some(GraphLockGuard {
                    locks: &self.locks,
                    key: graph_id.to_string(),
                })
            }
            dashmap::mapref::entry::Entry::Occupied(_) => None,
        }
    }

    fn ack_all(&self, entries: &[(String, Review)]) {
        for (lease, _) in entries {
            self.queues.ack(names::REVIEWS, lease);
        }
    }

    async fn commit_group(&self, graph_id: &str, entries: Vec<(String, Review)>) {
        // Per-graph advisory lock: if held, another commit for this graph is
        // in progress, so requeue and let the next tick retry.
        let Some(_guard) = self.try_lock(graph_id) else {
            for (lease, _) in &entries {
                self.queues.nack(names::REVIEWS, lease, true);
            }
            return;
        };

        // Inspect review status locally; not-approved reviews are consumed
        // here, never parked.
        let mut approved: Vec<&Review> = Vec::new();
        for (_, review) in &entries {
            if review.is_approved() {
                approved.push(review);
            } else {
                let patch_ids: Vec<&str> =
                    review.all_patches().iter().map(|p| p.patch_id.as_str()).collect();
                self.events.append(
                    EventKind::PatchRejected,
                    json!({
                        "graphId": graph_id,
                        "patchIds": patch_ids,
                        "reasons": review.reasons,
                    }),
                );
            }
        }

        // Flatten in submission order, dropping already-applied patch ids.
        let mut unseen: Vec<Patch> = Vec::new();
        for review in &approved {
            for patch in review.all_patches() {
                if !self.applied.contains(&patch.patch_id) {
                    unseen.push(patch.clone());
                }
            }
        }
        if unseen.is_empty() {
            self.ack_all(&entries);
            return;
        }

        // Merge check: one stale patch fails the whole group.
        let snapshot = self.store.snapshot();
        for patch in &unseen {
            if patch.base_hash.is_some() && !self.merge.can_merge(patch, snapshot.as_ref()) {
                tracing::warn!(graph = %graph_id, patch = %patch.patch_id, "merge conflict");
                self.events.append(
                    EventKind::PatchRejected,
                    json!({"graphId": graph_id, "reason": "conflict", "patchId": patch.patch_id}),
                );
                self.telemetry.record(
                    TelemetryKind::ActionFeedback,
                    None,
                    json!({"status": "conflict", "graphId": graph_id, "patchId": patch.patch_id}),
                );
                self.ack_all(&entries);
                return;
            }
        }

        // Coalesce: concatenate ops in submission order. Array-order
        // application makes last-writer-wins the policy for conflicting
        // update ops on the same entity.
        let mut ops: Vec<Op> = Vec::new();
        let mut thread_ids: Vec<String> = Vec::new();
        let mut api_key: Option<String> = None;
        let mut api_config: Option<Value> = None;
        let mut agentic = false;
        let mut iteration: u32 = 0;
        let mut cid: Option<String> = None;
        for patch in &unseen {
            ops.extend(patch.ops.iter().cloned());
            if let Some(thread) = &patch.thread_id {
                if !thread_ids.contains(thread) {
                    thread_ids.push(thread.clone());
                }
            }
            if api_key.is_none() {
                api_key = patch.meta.api_key.clone();
            }
            if api_config.is_none() {
                api_config = patch.meta.api_config.clone();
            }
            agentic |= patch.meta.agentic_loop.unwrap_or(false);
            iteration = iteration.max(patch.meta.iteration.unwrap_or(0));
            if cid.is_none() {
                cid = patch
                    .meta
                    .extra
                    .get("cid")
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
        }

        // Resolve NEW_GRAPH placeholders against createNewGraph ops in this
        // batch. An unresolved placeholder fails the batch: the reviews are
        // still acked to avoid a redelivery storm.
        let mut placeholder_map: HashMap<String, String> = HashMap::new();
        for op in &ops {
            if let Some(init) = op.created_graph() {
                if !init.id.is_empty() {
                    placeholder_map
                        .insert(graphmodel::graph_placeholder(&init.name), init.id.clone());
                }
            }
        }
        let mut unresolved: Option<String> = None;
        for op in ops.iter_mut() {
            let Some(op_graph) = op.graph_id().map(String::from) else {
                continue;
            };
            if is_graph_placeholder(&op_graph) {
                match placeholder_map.get(&op_graph) {
                    Some(real) => op.set_graph_id(real),
                    None => {
                        unresolved = Some(op_graph);
                        break;
                    }
                }
            }
        }
        if let Some(placeholder) = unresolved {
            tracing::error!(graph = %graph_id, %placeholder, "unresolved graph placeholder; rejecting batch");
            self.events.append(
                EventKind::PatchRejected,
                json!({"graphId": graph_id, "reason": "unresolved_placeholder", "placeholder": placeholder}),
            );
            self.ack_all(&entries);
            return;
        }

        // Split reads from mutations; reads go to chat, never the canvas.
        let (reads, mutations): (Vec<Op>, Vec<Op>) =
            ops.into_iter().partition(|op| op.is_read_response());

        for op in &reads {
            let Op::ReadResponse { tool_name, data } = op else {
                continue;
            };
            let summary = read_summary(tool_name, data);
            for thread in &thread_ids {
                post_chat(
                    &self.chat,
                    &self.events,
                    &self.telemetry,
                    "assistant",
                    &summary,
                    Some(thread.clone()),
                );
            }
            // Auto-chain: hand the read result back to the agent.
            if api_key.is_some() {
                self.fire_continuation(json!({
                    "cid": cid,
                    "readResult": data,
                    "graphState": snapshot.as_ref().map(graph_state_digest),
                    "iteration": iteration,
                    "apiConfig": api_config,
                    "apiKey": api_key,
                }));
            }
        }

        let created_ids: Vec<String> = mutations
            .iter()
            .filter_map(|op| op.created_graph().map(|init| init.id.clone()))
            .collect();
        let node_count = mutations.iter().filter(|op| op.is_instance_add()).count();
        let edge_count = mutations.iter().filter(|op| op.is_edge_add()).count();
        let total_ops = reads.len() + mutations.len();

        if !mutations.is_empty() {
            let created_names: Vec<String> = mutations
                .iter()
                .filter_map(|op| op.created_graph().map(|init| init.name.clone()))
                .collect();
            let mut bundle = PendingAction::apply_mutations(mutations);
            if let Some(cid) = &cid {
                bundle = bundle.with_cid(cid.clone());
            }
            let mut batch = vec![bundle];
            for id in &created_ids {
                // A created graph is opened after its ops have applied.
                batch.push(PendingAction::open_graph(id.clone()));
            }
            self.outbox.enqueue_bundle(batch);

            let summary = completion_summary(&created_names, node_count, edge_count);
            for thread in &thread_ids {
                post_chat(
                    &self.chat,
                    &self.events,
                    &self.telemetry,
                    "assistant",
                    &summary,
                    Some(thread.clone()),
                );
            }
            if let Some(tool) = completion_tool(&created_ids, node_count, edge_count) {
                self.telemetry.record(
                    TelemetryKind::ToolCall,
                    cid.clone(),
                    json!({"tool": tool, "status": "completed", "graphId": graph_id}),
                );
            }

            // Agentic loop: let the model decide whether to keep going.
            if (agentic || node_count >= 3) && api_key.is_some() {
                self.fire_continuation(json!({
                    "cid": cid,
                    "graphState": snapshot.as_ref().map(graph_state_digest),
                    "iteration": iteration + 1,
                    "apiConfig": api_config,
                    "apiKey": api_key,
                }));
            } else {
                for thread in &thread_ids {
                    post_chat(
                        &self.chat,
                        &self.events,
                        &self.telemetry,
                        "assistant",
                        "Done!",
                        Some(thread.clone()),
                    );
                }
            }
        }

        for patch in &unseen {
            self.applied.insert(&patch.patch_id);
        }
        self.events.append(
            EventKind::PatchApplied,
            json!({"graphId": graph_id, "opsCount": total_ops}),
        );
        self.ack_all(&entries);
    }

    /// Fire-and-forget continuation; the loop never blocks on network IO.
    fn fire_continuation(&self, payload: Value) {
        let hooks = Arc::clone(&self.hooks);
        tokio::spawn(async move {
            hooks.continue_agent(payload).await;
        });
    }

    /// Spawn the commit loop at the given cadence.
    pub fn spawn(
        self: &Arc<Self>,
        cadence: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let committer = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(cadence) => {
                        committer.tick().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Compact graph-world digest shipped to the continuation endpoint.
fn graph_state_digest(store: &ProjectedStore) -> Value {
    json!({
        "activeGraphId": store.active_graph_id,
        "graphs": store
            .graphs
            .iter()
            .map(|g| json!({"id": g.id, "name": g.name, "instanceCount": g.count_instances(), "edgeCount": g.edge_ids.len()}))
            .collect::<Vec<_>>(),
    })
}

/// One-line chat digest of a read result.
fn read_summary(tool_name: &str, data: &Value) -> String {
    match tool_name {
        "read_graph_structure" => {
            let name = data["name"].as_str().unwrap_or("graph");
            let nodes = data["nodeCount"].as_u64().unwrap_or(0);
            let edges = data["edgeCount"].as_u64().unwrap_or(0);
            format!("Read \"{}\": {} node(s), {} edge(s).", name, nodes, edges)
        }
        "list_available_graphs" => {
            let names: Vec<&str> = data["graphs"]
                .as_array()
                .map(|graphs| {
                    graphs
                        .iter()
                        .filter_map(|g| g["name"].as_str())
                        .collect()
                })
                .unwrap_or_default();
            if names.is_empty() {
                "No graphs available yet.".to_string()
            } else {
                format!("Available graphs: {}.", names.join(", "))
            }
        }
        "verify_state" => {
            let graphs = data["graphCount"].as_u64().unwrap_or(0);
            match data["activeGraphDigest"].as_str() {
                Some(digest) => format!("State: {} graph(s). Active {}", graphs, digest),
                None => format!("State: {} graph(s), none active.", graphs),
            }
        }
        "get_graph_instances" => {
            let name = data["name"].as_str().unwrap_or("graph");
            let count = data["instances"].as_array().map(|a| a.len()).unwrap_or(0);
            format!("\"{}\" has {} instance(s).", name, count)
        }
        "identify_patterns" => {
            let instances = data["instanceCount"].as_u64().unwrap_or(0);
            let distinct = data["distinctPrototypes"].as_u64().unwrap_or(0);
            format!(
                "Patterns: {} instance(s) across {} prototype(s).",
                instances, distinct
            )
        }
        other => format!("{}: {}", other, data),
    }
}

fn completion_summary(created_names: &[String], nodes: usize, edges: usize) -> String {
    if let Some(name) = created_names.first() {
        if nodes == 0 && edges == 0 {
            return format!("Created graph \"{}\".", name);
        }
        return format!(
            "Created graph \"{}\" with {} node(s) and {} edge(s).",
            name, nodes, edges
        );
    }
    format!("Applied {} node(s) and {} edge(s).", nodes, edges)
}

/// Tool-completion tag inferred from the op-tag mix.
fn completion_tool(created: &[String], nodes: usize, edges: usize) -> Option<&'static str> {
    if !created.is_empty() && nodes > 0 {
        Some("create_populated_graph")
    } else if nodes > 0 {
        Some("create_subgraph")
    } else if edges > 0 {
        Some("define_connections")
    } else {
        None
    }
}
