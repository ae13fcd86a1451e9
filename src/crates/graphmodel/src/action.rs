//! Pending actions
//!
//! A [`PendingAction`] is a UI-bound instruction: leased by the UI on GET,
//! applied locally, and acked on POST. The `action` tag is an open set so the
//! server can forward instructions minted by newer components without
//! understanding them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action tag on a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    ApplyMutations,
    OpenGraph,
    AddNodePrototype,
    CreateNewGraph,
    CreateAndAssignGraphDefinition,
    RemoveNodeInstance,
    #[serde(untagged)]
    Other(String),
}

/// Optional action metadata; `cid` correlates the action to a chat turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A UI-bound instruction held in the pending-action outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: String,
    pub action: ActionKind,
    #[serde(default)]
    pub params: Vec<Value>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ActionMeta>,
}

impl PendingAction {
    pub fn new(action: ActionKind, params: Vec<Value>) -> Self {
        Self {
            id: crate::ids::fresh_id("action"),
            action,
            params,
            timestamp: crate::now_ms(),
            meta: None,
        }
    }

    /// An `applyMutations` bundle; ops are applied by the UI in array order.
    pub fn apply_mutations(ops: Vec<crate::op::Op>) -> Self {
        let ops_json = ops
            .into_iter()
            .map(|op| serde_json::to_value(op).unwrap_or(Value::Null))
            .collect();
        Self::new(ActionKind::ApplyMutations, vec![Value::Array(ops_json)])
    }

    /// An `openGraph` instruction for the given graph id.
    pub fn open_graph(graph_id: impl Into<String>) -> Self {
        Self::new(ActionKind::OpenGraph, vec![Value::String(graph_id.into())])
    }

    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        let meta = self.meta.get_or_insert_with(ActionMeta::default);
        meta.cid = Some(cid.into());
        self
    }

    /// Count of mutation ops inside an `applyMutations` bundle (0 otherwise).
    pub fn op_count(&self) -> usize {
        if self.action != ActionKind::ApplyMutations {
            return 0;
        }
        self.params
            .first()
            .and_then(|p| p.as_array())
            .map(|a| a.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{GraphInit, Op};

    #[test]
    fn test_action_kind_tags() {
        let json = serde_json::to_value(ActionKind::ApplyMutations).unwrap();
        assert_eq!(json, "applyMutations");
        let json = serde_json::to_value(ActionKind::OpenGraph).unwrap();
        assert_eq!(json, "openGraph");
    }

    #[test]
    fn test_action_kind_open_set() {
        let unknown: ActionKind = serde_json::from_str("\"zoomToFit\"").unwrap();
        assert_eq!(unknown, ActionKind::Other("zoomToFit".to_string()));
    }

    #[test]
    fn test_apply_mutations_params_shape() {
        let action = PendingAction::apply_mutations(vec![Op::CreateNewGraph {
            initial_data: GraphInit::new("g1", "Test"),
        }]);
        assert_eq!(action.op_count(), 1);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "applyMutations");
        assert_eq!(json["params"][0][0]["type"], "createNewGraph");
    }

    #[test]
    fn test_cid_meta() {
        let action = PendingAction::open_graph("g1").with_cid("cid-42");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["meta"]["cid"], "cid-42");
        assert_eq!(json["params"][0], "g1");
    }
}
