//! Projected store snapshot
//!
//! The UI periodically POSTs a snapshot of its projected store; that snapshot
//! is the only graph-world state the server ever reads. The server never
//! becomes authoritative: all mutation flows back to the UI through pending
//! actions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A placed occurrence of a prototype in one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub prototype_id: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// One graph in the projected store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphSnapshot {
    pub id: String,
    pub name: String,
    pub instances: HashMap<String, InstanceSnapshot>,
    pub edge_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_count: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphSnapshot {
    /// Instance count, preferring the explicit field over the map size.
    pub fn count_instances(&self) -> usize {
        self.instance_count.unwrap_or(self.instances.len())
    }

    /// Tally of instances per prototype id, descending by count.
    pub fn prototype_tally(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for inst in self.instances.values() {
            *counts.entry(inst.prototype_id.as_str()).or_default() += 1;
        }
        let mut tally: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(id, n)| (id.to_string(), n))
            .collect();
        tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tally
    }
}

/// A reusable concept definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrototypeSnapshot {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bookkeeping attached to a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSummary {
    pub last_update: i64,
}

/// The UI-owned snapshot of the graph world, authoritative for reads only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectedStore {
    pub graphs: Vec<GraphSnapshot>,
    pub node_prototypes: Vec<PrototypeSnapshot>,
    pub active_graph_id: Option<String>,
    pub active_graph_name: Option<String>,
    pub open_graph_ids: Vec<String>,
    pub graph_layouts: HashMap<String, Value>,
    pub graph_summaries: Value,
    pub file_status: Option<Value>,
    pub summary: StoreSummary,
}

impl ProjectedStore {
    pub fn graph(&self, id: &str) -> Option<&GraphSnapshot> {
        self.graphs.iter().find(|g| g.id == id)
    }

    /// Case- and whitespace-insensitive graph lookup by name, preferring an
    /// exact normalized match over a contains match.
    pub fn graph_by_name(&self, name: &str) -> Option<&GraphSnapshot> {
        let wanted = normalize(name);
        self.graphs
            .iter()
            .find(|g| normalize(&g.name) == wanted)
            .or_else(|| {
                self.graphs
                    .iter()
                    .find(|g| normalize(&g.name).contains(&wanted) && !wanted.is_empty())
            })
    }

    pub fn prototype(&self, id: &str) -> Option<&PrototypeSnapshot> {
        self.node_prototypes.iter().find(|p| p.id == id)
    }

    pub fn prototype_by_name(&self, name: &str) -> Option<&PrototypeSnapshot> {
        let wanted = normalize(name);
        self.node_prototypes
            .iter()
            .find(|p| normalize(&p.name) == wanted)
    }

    pub fn active_graph(&self) -> Option<&GraphSnapshot> {
        self.active_graph_id.as_deref().and_then(|id| self.graph(id))
    }

    /// Short natural-language digest of a graph's contents: instances per
    /// prototype name, top `limit` entries. Used by `verify_state` and by the
    /// chat status summarizer.
    pub fn graph_digest(&self, graph_id: &str, limit: usize) -> Option<String> {
        let graph = self.graph(graph_id)?;
        let tally = graph.prototype_tally();
        let mut parts: Vec<String> = tally
            .iter()
            .take(limit)
            .map(|(proto_id, n)| {
                let name = self
                    .prototype(proto_id)
                    .map(|p| p.name.as_str())
                    .unwrap_or(proto_id.as_str());
                format!("{} x{}", name, n)
            })
            .collect();
        if parts.is_empty() {
            parts.push("no instances".to_string());
        }
        Some(format!(
            "\"{}\": {} instance(s), {} edge(s) ({})",
            graph.name,
            graph.count_instances(),
            graph.edge_ids.len(),
            parts.join(", ")
        ))
    }
}

/// Normalized form used for name matching: lowercase, collapsed whitespace.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> ProjectedStore {
        let mut instances = HashMap::new();
        instances.insert(
            "i1".to_string(),
            InstanceSnapshot {
                prototype_id: "p1".into(),
                x: 100.0,
                y: 200.0,
            },
        );
        instances.insert(
            "i2".to_string(),
            InstanceSnapshot {
                prototype_id: "p1".into(),
                x: 150.0,
                y: 250.0,
            },
        );
        ProjectedStore {
            graphs: vec![GraphSnapshot {
                id: "g1".into(),
                name: "Breaking Bad".into(),
                instances,
                edge_ids: vec!["e1".into()],
                ..Default::default()
            }],
            node_prototypes: vec![PrototypeSnapshot {
                id: "p1".into(),
                name: "Character".into(),
                ..Default::default()
            }],
            active_graph_id: Some("g1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_deserialize_minimal_snapshot() {
        let store: ProjectedStore = serde_json::from_str("{}").unwrap();
        assert!(store.graphs.is_empty());
        assert!(store.active_graph_id.is_none());
    }

    #[test]
    fn test_graph_by_name_normalized() {
        let store = sample_store();
        assert!(store.graph_by_name("breaking  bad").is_some());
        assert!(store.graph_by_name("BREAKING BAD").is_some());
        assert!(store.graph_by_name("breaking").is_some()); // contains fallback
        assert!(store.graph_by_name("better call saul").is_none());
    }

    #[test]
    fn test_graph_digest() {
        let store = sample_store();
        let digest = store.graph_digest("g1", 10).unwrap();
        assert!(digest.contains("Breaking Bad"));
        assert!(digest.contains("2 instance(s)"));
        assert!(digest.contains("Character x2"));
    }

    #[test]
    fn test_active_graph() {
        let store = sample_store();
        assert_eq!(store.active_graph().unwrap().id, "g1");
    }
}
