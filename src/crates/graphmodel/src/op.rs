//! Atomic mutation ops
//!
//! An [`Op`] is one atomic mutation against the graph world, carried inside a
//! [`crate::Patch`]. Ops are a tagged union on the wire (`"type"` field,
//! camelCase tags) and the UI applies them in array order within a batch.
//! `readResponse` is the one non-mutating variant: it carries read-side tool
//! results back toward chat instead of toward the canvas.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A 2D canvas position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Seed data for a graph created by `createNewGraph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphInit {
    pub id: String,
    pub name: String,
    /// Additional fields forwarded to the UI untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphInit {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Seed data for a node prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrototypeInit {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PrototypeInit {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: None,
            description: None,
            extra: Map::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Arrowhead directionality for an edge. `arrows_toward` lists the instance
/// ids the arrowheads point at; an empty list means undirected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directionality {
    #[serde(default)]
    pub arrows_toward: Vec<String>,
}

/// Seed data for an edge between two instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeInit {
    pub id: String,
    pub source_id: String,
    pub destination_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_node_id: Option<String>,
    #[serde(default)]
    pub directionality: Directionality,
}

impl EdgeInit {
    /// Create a forward-directed edge (arrowhead toward the destination).
    pub fn directed(
        id: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> Self {
        let destination_id = destination_id.into();
        Self {
            id: id.into(),
            source_id: source_id.into(),
            destination_id: destination_id.clone(),
            name: None,
            type_node_id: None,
            directionality: Directionality {
                arrows_toward: vec![destination_id],
            },
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// One atomic mutation (or read result) in a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Op {
    /// Create a new graph from seed data.
    CreateNewGraph { initial_data: GraphInit },
    /// Register a reusable node prototype.
    AddNodePrototype { prototype_data: PrototypeInit },
    /// Place an instance of a prototype in a graph.
    AddNodeInstance {
        graph_id: String,
        prototype_id: String,
        position: Position,
        instance_id: String,
    },
    /// Move an existing instance.
    MoveNodeInstance {
        graph_id: String,
        instance_id: String,
        position: Position,
    },
    /// Remove an instance from a graph.
    RemoveNodeInstance {
        graph_id: String,
        instance_id: String,
    },
    /// Connect two instances.
    AddEdge { graph_id: String, edge_data: EdgeInit },
    /// Update an edge definition in place.
    UpdateEdgeDefinition {
        edge_id: String,
        #[serde(default)]
        updates: Value,
    },
    /// Update prototype fields in place.
    UpdateNodePrototype {
        prototype_id: String,
        updates: Value,
    },
    /// Update graph fields in place.
    UpdateGraph { graph_id: String, updates: Value },
    /// Read-side tool result; routed to chat, never to the canvas.
    ReadResponse { tool_name: String, data: Value },
}

impl Op {
    /// The target graph id this op names, if any.
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            Op::AddNodeInstance { graph_id, .. }
            | Op::MoveNodeInstance { graph_id, .. }
            | Op::RemoveNodeInstance { graph_id, .. }
            | Op::AddEdge { graph_id, .. }
            | Op::UpdateGraph { graph_id, .. } => Some(graph_id),
            _ => None,
        }
    }

    /// Rewrite the target graph id in place, if this op carries one.
    pub fn set_graph_id(&mut self, id: &str) {
        match self {
            Op::AddNodeInstance { graph_id, .. }
            | Op::MoveNodeInstance { graph_id, .. }
            | Op::RemoveNodeInstance { graph_id, .. }
            | Op::AddEdge { graph_id, .. }
            | Op::UpdateGraph { graph_id, .. } => *graph_id = id.to_string(),
            _ => {}
        }
    }

    /// The id of the graph this op creates, for `createNewGraph` ops.
    pub fn created_graph(&self) -> Option<&GraphInit> {
        match self {
            Op::CreateNewGraph { initial_data } => Some(initial_data),
            _ => None,
        }
    }

    /// True for the non-mutating `readResponse` variant.
    pub fn is_read_response(&self) -> bool {
        matches!(self, Op::ReadResponse { .. })
    }

    /// True if applying this op adds a node instance to a graph.
    pub fn is_instance_add(&self) -> bool {
        matches!(self, Op::AddNodeInstance { .. })
    }

    /// True if applying this op adds an edge.
    pub fn is_edge_add(&self) -> bool {
        matches!(self, Op::AddEdge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_wire_tags() {
        let op = Op::CreateNewGraph {
            initial_data: GraphInit::new("graph-1", "Breaking Bad"),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "createNewGraph");
        assert_eq!(json["initialData"]["id"], "graph-1");
        assert_eq!(json["initialData"]["name"], "Breaking Bad");
    }

    #[test]
    fn test_add_instance_field_names() {
        let op = Op::AddNodeInstance {
            graph_id: "g1".into(),
            prototype_id: "p1".into(),
            position: Position::new(320.0, 100.0),
            instance_id: "i1".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "addNodeInstance");
        assert_eq!(json["graphId"], "g1");
        assert_eq!(json["prototypeId"], "p1");
        assert_eq!(json["instanceId"], "i1");
        assert_eq!(json["position"]["x"], 320.0);
    }

    #[test]
    fn test_read_response_roundtrip() {
        let op = Op::ReadResponse {
            tool_name: "verify_state".into(),
            data: serde_json::json!({"graphs": 2}),
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: Op = serde_json::from_str(&json).unwrap();
        assert!(back.is_read_response());
        assert_eq!(back, op);
    }

    #[test]
    fn test_graph_id_rewrite() {
        let mut op = Op::AddEdge {
            graph_id: "NEW_GRAPH:Baking".into(),
            edge_data: EdgeInit::directed("e1", "i1", "i2"),
        };
        assert_eq!(op.graph_id(), Some("NEW_GRAPH:Baking"));
        op.set_graph_id("graph-9");
        assert_eq!(op.graph_id(), Some("graph-9"));
    }

    #[test]
    fn test_directed_edge_arrows() {
        let edge = EdgeInit::directed("e1", "a", "b");
        assert_eq!(edge.directionality.arrows_toward, vec!["b".to_string()]);
    }

    #[test]
    fn test_unknown_extra_fields_preserved() {
        let json = r##"{"type":"addNodePrototype","prototypeData":{"id":"p1","name":"Flour","color":"#5B6CFF","typeNodeId":"t1"}}"##;
        let op: Op = serde_json::from_str(json).unwrap();
        match &op {
            Op::AddNodePrototype { prototype_data } => {
                assert_eq!(prototype_data.color.as_deref(), Some("#5B6CFF"));
                assert!(prototype_data.extra.contains_key("typeNodeId"));
            }
            _ => panic!("Expected addNodePrototype"),
        }
    }
}
