//! Pending-action outbox
//!
//! A lease-based outbox of UI-bound actions. The UI long-polls the
//! pending-actions endpoint (lease-on-GET), applies what it leased, and
//! acks by id (ack-on-POST). Transient failures come back through the
//! feedback path without removing the action.
//!
//! Every transition records `tool_call` telemetry with a monotone status
//! (queued → leased → completed/failed) per action id, and acks are tagged
//! with the global `actionSequence` counter for total-order analysis.

use crate::events::{EventKind, EventLog};
use crate::telemetry::{TelemetryKind, TelemetryRing};
use graphmodel::{ActionKind, PendingAction};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct OutboxState {
    actions: Vec<PendingAction>,
    inflight: HashSet<String>,
    inflight_meta: HashMap<String, i64>,
}

/// Lease-based outbox of pending actions feeding the UI.
pub struct ActionOutbox {
    state: Mutex<OutboxState>,
    action_sequence: AtomicU64,
    events: Arc<EventLog>,
    telemetry: Arc<TelemetryRing>,
}

impl ActionOutbox {
    pub fn new(events: Arc<EventLog>, telemetry: Arc<TelemetryRing>) -> Self {
        Self {
            state: Mutex::new(OutboxState::default()),
            action_sequence: AtomicU64::new(0),
            events,
            telemetry,
        }
    }

    /// Append actions as-is (router side-paths).
    pub fn enqueue_actions(&self, actions: Vec<PendingAction>) -> Vec<String> {
        self.push(actions)
    }

    /// Append a committer/drainer bundle, prepending `openGraph` actions for
    /// every pre-existing graph id the bundle's mutation ops mention, so the
    /// UI lands on the right graph before mutations apply. Graphs created
    /// inside the bundle are excluded: those cannot be opened until their
    /// `createNewGraph` op has run, so the committer appends their
    /// `openGraph` after the mutations instead.
    pub fn enqueue_bundle(&self, actions: Vec<PendingAction>) -> Vec<String> {
        let mut opened: HashSet<String> = actions
            .iter()
            .filter(|a| a.action == ActionKind::OpenGraph)
            .filter_map(|a| a.params.first().and_then(|p| p.as_str()).map(String::from))
            .collect();

        let mut prefixed = Vec::new();
        for action in &actions {
            if action.action != ActionKind::ApplyMutations {
                continue;
            }
            let created = created_graph_ids(action);
            for graph_id in mentioned_graph_ids(action) {
                if created.contains(&graph_id) {
                    continue;
                }
                if opened.insert(graph_id.clone()) {
                    let mut open = PendingAction::open_graph(graph_id);
                    open.meta = action.meta.clone();
                    prefixed.push(open);
                }
            }
        }
        prefixed.extend(actions);
        self.push(prefixed)
    }

    fn push(&self, actions: Vec<PendingAction>) -> Vec<String> {
        if actions.is_empty() {
            return Vec::new();
        }
        let ids: Vec<String> = actions.iter().map(|a| a.id.clone()).collect();
        {
            let mut state = self.state.lock();
            state.actions.extend(actions.iter().cloned());
        }
        for action in &actions {
            self.telemetry.record(
                TelemetryKind::ToolCall,
                action.meta.as_ref().and_then(|m| m.cid.clone()),
                json!({
                    "actionId": action.id,
                    "action": action.action,
                    "status": "queued",
                }),
            );
        }
        self.events.append(
            EventKind::PendingActionsEnqueued,
            json!({"count": ids.len(), "ids": ids}),
        );
        ids
    }

    /// Lease-on-GET: return every action not currently inflight and mark it
    /// inflight atomically with the suffix filter, so two concurrent pulls
    /// can never lease the same id. Emits the pre-action summary telemetry.
    pub fn lease(&self) -> Vec<PendingAction> {
        let now = graphmodel::now_ms();
        let leased: Vec<PendingAction> = {
            let mut state = self.state.lock();
            let fresh: Vec<PendingAction> = state
                .actions
                .iter()
                .filter(|a| !state.inflight.contains(&a.id))
                .cloned()
                .collect();
            for action in &fresh {
                state.inflight.insert(action.id.clone());
                state.inflight_meta.insert(action.id.clone(), now);
            }
            fresh
        };

        for action in &leased {
            let cid = action.meta.as_ref().and_then(|m| m.cid.clone());
            self.telemetry.record(
                TelemetryKind::AgentAnswer,
                cid.clone(),
                json!({"text": pre_summary(action), "actionId": action.id}),
            );
            self.telemetry.record(
                TelemetryKind::ToolCall,
                cid,
                json!({"actionId": action.id, "action": action.action, "status": "leased"}),
            );
        }
        leased
    }

    /// Ack-on-POST: drop the action, bump the global action sequence, and
    /// record the post-action summary tagged with that sequence.
    pub fn ack(&self, action_id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let before = state.actions.len();
            state.actions.retain(|a| a.id != action_id);
            state.inflight.remove(action_id);
            state.inflight_meta.remove(action_id);
            before != state.actions.len()
        };
        if removed {
            let seq = self.action_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            self.telemetry.record(
                TelemetryKind::AgentAnswer,
                None,
                json!({"text": "Action completed.", "actionId": action_id, "actionSequence": seq}),
            );
            self.telemetry.record(
                TelemetryKind::ToolCall,
                None,
                json!({"actionId": action_id, "status": "completed", "actionSequence": seq}),
            );
        }
        removed
    }

    /// Failure feedback: recorded, never removes the action.
    pub fn feedback(&self, action: &str, status: &str, error: Option<&str>, params: Value) {
        self.telemetry.record(
            TelemetryKind::ActionFeedback,
            None,
            json!({
                "action": action,
                "status": status,
                "error": error,
                "params": params,
            }),
        );
        if status != "ok" {
            self.telemetry.record(
                TelemetryKind::ToolCall,
                None,
                json!({"actionId": action, "status": "failed", "error": error}),
            );
        }
    }

    /// Total actions currently held (leased or not).
    pub fn depth(&self) -> usize {
        self.state.lock().actions.len()
    }

    /// Count of applied actions so far.
    pub fn action_sequence(&self) -> u64 {
        self.action_sequence.load(Ordering::SeqCst)
    }

    /// Snapshot without leasing, for tests and inspection.
    pub fn snapshot(&self) -> Vec<PendingAction> {
        self.state.lock().actions.clone()
    }
}

/// Graph ids minted by `createNewGraph` ops inside an `applyMutations`
/// action.
fn created_graph_ids(action: &PendingAction) -> HashSet<String> {
    let mut ids = HashSet::new();
    let Some(ops) = action.params.first().and_then(|p| p.as_array()) else {
        return ids;
    };
    for op in ops {
        if op.get("type").and_then(|t| t.as_str()) == Some("createNewGraph") {
            if let Some(id) = op
                .get("initialData")
                .and_then(|d| d.get("id"))
                .and_then(|v| v.as_str())
            {
                ids.insert(id.to_string());
            }
        }
    }
    ids
}

/// Union of graph ids mentioned by the ops inside an `applyMutations`
/// action's params.
fn mentioned_graph_ids(action: &PendingAction) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let Some(ops) = action.params.first().and_then(|p| p.as_array()) else {
        return ids;
    };
    for op in ops {
        if let Some(graph_id) = op.get("graphId").and_then(|v| v.as_str()) {
            if seen.insert(graph_id.to_string()) {
                ids.push(graph_id.to_string());
            }
        }
    }
    ids
}

/// Short human summary announced before the UI applies an action.
fn pre_summary(action: &PendingAction) -> String {
    match &action.action {
        ActionKind::ApplyMutations => {
            format!("Starting: apply {} change(s).", action.op_count())
        }
        ActionKind::OpenGraph => "Starting: open graph.".to_string(),
        ActionKind::CreateNewGraph => "Starting: create 1 graph(s).".to_string(),
        ActionKind::CreateAndAssignGraphDefinition => "Starting: define 1 graph(s).".to_string(),
        ActionKind::AddNodePrototype => {
            let name = action
                .params
                .first()
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("concept");
            format!("Starting: add \"{}\".", name)
        }
        ActionKind::RemoveNodeInstance => "Starting: remove 1 node(s).".to_string(),
        ActionKind::Other(tag) => format!("Starting: {}.", tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmodel::{GraphInit, Op};

    fn outbox() -> ActionOutbox {
        ActionOutbox::new(
            Arc::new(EventLog::new(100)),
            Arc::new(TelemetryRing::new(100)),
        )
    }

    #[test]
    fn test_lease_marks_inflight_once() {
        let o = outbox();
        o.enqueue_actions(vec![PendingAction::open_graph("g1")]);

        let first = o.lease();
        assert_eq!(first.len(), 1);
        let second = o.lease();
        assert!(second.is_empty(), "leased action must not be re-leased");
    }

    #[test]
    fn test_ack_removes_and_sequences() {
        let o = outbox();
        let ids = o.enqueue_actions(vec![
            PendingAction::open_graph("g1"),
            PendingAction::open_graph("g2"),
        ]);
        o.lease();

        assert!(o.ack(&ids[0]));
        assert!(!o.ack(&ids[0]));
        assert_eq!(o.action_sequence(), 1);
        assert_eq!(o.depth(), 1);
    }

    #[test]
    fn test_new_actions_leasable_after_partial_ack() {
        let o = outbox();
        o.enqueue_actions(vec![PendingAction::open_graph("g1")]);
        o.lease();
        o.enqueue_actions(vec![PendingAction::open_graph("g2")]);

        let leased = o.lease();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].params[0], "g2");
    }

    #[test]
    fn test_bundle_prepends_open_graph() {
        let o = outbox();
        let bundle = PendingAction::apply_mutations(vec![Op::AddNodeInstance {
            graph_id: "g7".into(),
            prototype_id: "p1".into(),
            position: graphmodel::Position::new(0.0, 0.0),
            instance_id: "i1".into(),
        }]);
        o.enqueue_bundle(vec![bundle]);

        let actions = o.snapshot();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].action, ActionKind::OpenGraph);
        assert_eq!(actions[0].params[0], "g7");
        assert_eq!(actions[1].action, ActionKind::ApplyMutations);
    }

    #[test]
    fn test_bundle_does_not_duplicate_explicit_open() {
        let o = outbox();
        let bundle = PendingAction::apply_mutations(vec![Op::CreateNewGraph {
            initial_data: GraphInit::new("g1", "Test"),
        }, Op::AddNodeInstance {
            graph_id: "g1".into(),
            prototype_id: "p1".into(),
            position: graphmodel::Position::new(0.0, 0.0),
            instance_id: "i1".into(),
        }]);
        o.enqueue_bundle(vec![PendingAction::open_graph("g1"), bundle]);

        let opens = o
            .snapshot()
            .into_iter()
            .filter(|a| a.action == ActionKind::OpenGraph)
            .count();
        assert_eq!(opens, 1);
    }

    #[test]
    fn test_feedback_keeps_action() {
        let o = outbox();
        let ids = o.enqueue_actions(vec![PendingAction::open_graph("g1")]);
        o.feedback(&ids[0], "error", Some("canvas not ready"), Value::Null);
        assert_eq!(o.depth(), 1);
    }
}
