//! GraphSpec executor
//!
//! Turns a planner-supplied node/edge spec into pending actions: new
//! prototypes as individual `addNodePrototype` actions, then one
//! `applyMutations` batch holding every instance op followed by every edge
//! op, so the UI applies them in a single ordered pass.

use crate::router::plan::GraphSpec;
use graphmodel::{
    fresh_id, EdgeInit, Op, PendingAction, Position, ProjectedStore,
};
use serde_json::json;
use std::collections::HashMap;

const DEFAULT_COLOR: &str = "#5B6CFF";
const CIRCLE_CENTER: (f64, f64) = (520.0, 320.0);
const CIRCLE_RADIUS: f64 = 180.0;
const MIN_X: f64 = 320.0;
const MIN_Y: f64 = 100.0;

/// Result of executing a graph spec.
#[derive(Debug)]
pub struct GraphSpecOutcome {
    pub actions: Vec<PendingAction>,
    pub summary: String,
    pub target_graph_id: String,
}

/// Resolve the target graph: the planner's named graph first (normalized,
/// exact preferred), then the conversation context. `Err` carries the
/// clarification question to ask instead.
pub fn resolve_target(
    store: &ProjectedStore,
    planned_name: Option<&str>,
    context_graph_id: Option<&str>,
) -> Result<String, String> {
    if let Some(name) = planned_name {
        if let Some(graph) = store.graph_by_name(name) {
            return Ok(graph.id.clone());
        }
    }
    if let Some(id) = context_graph_id {
        if store.graph(id).is_some() {
            return Ok(id.to_string());
        }
    }
    if let Some(active) = &store.active_graph_id {
        if store.graph(active).is_some() {
            return Ok(active.clone());
        }
    }
    Err("Which graph should these go in? I don't see one open.".to_string())
}

/// Execute a graph spec against the target graph.
pub fn execute(
    store: &ProjectedStore,
    spec: &GraphSpec,
    target_graph_id: &str,
    cid: &str,
) -> GraphSpecOutcome {
    let mut actions: Vec<PendingAction> = Vec::new();

    // Open the target first when the UI is looking elsewhere.
    if store.active_graph_id.as_deref() != Some(target_graph_id) {
        actions.push(PendingAction::open_graph(target_graph_id).with_cid(cid));
    }

    let count = spec.nodes.len().max(1);
    let mut prototype_ids: HashMap<String, String> = HashMap::new();
    let mut instance_ids: HashMap<String, String> = HashMap::new();
    let mut instance_ops: Vec<Op> = Vec::new();
    let mut new_prototypes = 0usize;

    for (index, node) in spec.nodes.iter().enumerate() {
        let prototype_id = match store.prototype_by_name(&node.name) {
            Some(existing) => existing.id.clone(),
            None => {
                let id = fresh_id("proto");
                let color = node.color.clone().unwrap_or_else(|| DEFAULT_COLOR.to_string());
                actions.push(
                    PendingAction::new(
                        graphmodel::ActionKind::AddNodePrototype,
                        vec![json!({
                            "id": id,
                            "name": node.name,
                            "color": color,
                        })],
                    )
                    .with_cid(cid),
                );
                new_prototypes += 1;
                id
            }
        };
        prototype_ids.insert(node.name.clone(), prototype_id.clone());

        let position = match (node.x, node.y) {
            (Some(x), Some(y)) => Position::new(x.max(MIN_X), y.max(MIN_Y)),
            _ => {
                let angle = 2.0 * std::f64::consts::PI * index as f64 / count as f64;
                Position::new(
                    CIRCLE_CENTER.0 + CIRCLE_RADIUS * angle.cos(),
                    CIRCLE_CENTER.1 + CIRCLE_RADIUS * angle.sin(),
                )
            }
        };

        let instance_id = fresh_id("inst");
        instance_ids.insert(node.name.clone(), instance_id.clone());
        instance_ops.push(Op::AddNodeInstance {
            graph_id: target_graph_id.to_string(),
            prototype_id,
            position,
            instance_id,
        });
    }

    // Edges whose endpoints map to instances created just now; default
    // directionality points at the destination.
    let mut edge_ops: Vec<Op> = Vec::new();
    for edge in &spec.edges {
        let (Some(source_id), Some(dest_id)) =
            (instance_ids.get(&edge.source), instance_ids.get(&edge.target))
        else {
            tracing::debug!(source = %edge.source, target = %edge.target, "edge endpoint missing; skipping");
            continue;
        };
        let mut init = EdgeInit::directed(fresh_id("edge"), source_id.clone(), dest_id.clone());
        if let Some(kind) = &edge.edge_type {
            init = init.with_name(kind.clone());
        }
        edge_ops.push(Op::AddEdge {
            graph_id: target_graph_id.to_string(),
            edge_data: init,
        });
    }

    // One batch: instances first, then edges, in array order.
    let node_count = instance_ops.len();
    let edge_count = edge_ops.len();
    let mut ops = instance_ops;
    ops.extend(edge_ops);
    if !ops.is_empty() {
        actions.push(PendingAction::apply_mutations(ops).with_cid(cid));
    }

    let summary = format!(
        "Placing {} node(s){} and {} connection(s).",
        node_count,
        if new_prototypes > 0 {
            format!(" ({} new concept(s))", new_prototypes)
        } else {
            String::new()
        },
        edge_count,
    );

    GraphSpecOutcome {
        actions,
        summary,
        target_graph_id: target_graph_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::plan::{SpecEdge, SpecNode};
    use graphmodel::{ActionKind, GraphSnapshot, PrototypeSnapshot};

    fn store() -> ProjectedStore {
        ProjectedStore {
            graphs: vec![GraphSnapshot {
                id: "g1".into(),
                name: "Baking".into(),
                ..Default::default()
            }],
            node_prototypes: vec![PrototypeSnapshot {
                id: "p-flour".into(),
                name: "Flour".into(),
                ..Default::default()
            }],
            active_graph_id: Some("g1".into()),
            ..Default::default()
        }
    }

    fn spec() -> GraphSpec {
        GraphSpec {
            nodes: vec![
                SpecNode { name: "Flour".into(), color: None, x: None, y: None },
                SpecNode { name: "Sugar".into(), color: None, x: None, y: None },
                SpecNode { name: "Butter".into(), color: None, x: None, y: None },
                SpecNode { name: "Eggs".into(), color: None, x: None, y: None },
            ],
            edges: vec![SpecEdge {
                source: "Flour".into(),
                target: "Eggs".into(),
                edge_type: Some("mixes with".into()),
            }],
        }
    }

    #[test]
    fn test_resolve_target_prefers_named_graph() {
        let s = store();
        assert_eq!(resolve_target(&s, Some("baking"), None).unwrap(), "g1");
        assert_eq!(resolve_target(&s, None, Some("g1")).unwrap(), "g1");
        assert_eq!(resolve_target(&s, None, None).unwrap(), "g1"); // active fallback
    }

    #[test]
    fn test_resolve_target_asks_when_nothing_matches() {
        let s = ProjectedStore::default();
        assert!(resolve_target(&s, Some("nope"), None).is_err());
    }

    #[test]
    fn test_new_prototypes_and_single_batch() {
        let s = store();
        let outcome = execute(&s, &spec(), "g1", "cid-1");

        // Flour exists; Sugar, Butter, Eggs are new prototypes.
        let protos: Vec<_> = outcome
            .actions
            .iter()
            .filter(|a| a.action == ActionKind::AddNodePrototype)
            .collect();
        assert_eq!(protos.len(), 3);
        assert_eq!(protos[0].params[0]["color"], "#5B6CFF");

        let batches: Vec<_> = outcome
            .actions
            .iter()
            .filter(|a| a.action == ActionKind::ApplyMutations)
            .collect();
        assert_eq!(batches.len(), 1, "instances and edges share one batch");

        let ops = batches[0].params[0].as_array().unwrap();
        assert_eq!(ops.len(), 5); // 4 instances + 1 edge
        assert!(ops[..4].iter().all(|op| op["type"] == "addNodeInstance"));
        assert_eq!(ops[4]["type"], "addEdge");
        assert_eq!(
            ops[4]["edgeData"]["directionality"]["arrowsToward"][0],
            ops[4]["edgeData"]["destinationId"]
        );
    }

    #[test]
    fn test_circle_placement() {
        let s = store();
        let outcome = execute(&s, &spec(), "g1", "cid-1");
        let batch = outcome
            .actions
            .iter()
            .find(|a| a.action == ActionKind::ApplyMutations)
            .unwrap();
        let ops = batch.params[0].as_array().unwrap();

        // Four nodes on a circle of radius 180 around (520, 320): first at
        // angle 0, second at pi/2.
        let x0 = ops[0]["position"]["x"].as_f64().unwrap();
        let y0 = ops[0]["position"]["y"].as_f64().unwrap();
        assert!((x0 - 700.0).abs() < 1e-6);
        assert!((y0 - 320.0).abs() < 1e-6);

        let x1 = ops[1]["position"]["x"].as_f64().unwrap();
        let y1 = ops[1]["position"]["y"].as_f64().unwrap();
        assert!((x1 - 520.0).abs() < 1e-6);
        assert!((y1 - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_positions_clamped() {
        let s = store();
        let spec = GraphSpec {
            nodes: vec![SpecNode {
                name: "Corner".into(),
                color: None,
                x: Some(10.0),
                y: Some(5.0),
            }],
            edges: vec![],
        };
        let outcome = execute(&s, &spec, "g1", "cid-1");
        let batch = outcome
            .actions
            .iter()
            .find(|a| a.action == ActionKind::ApplyMutations)
            .unwrap();
        let ops = batch.params[0].as_array().unwrap();
        assert_eq!(ops[0]["position"]["x"], 320.0);
        assert_eq!(ops[0]["position"]["y"], 100.0);
    }

    #[test]
    fn test_open_graph_prepended_when_inactive() {
        let mut s = store();
        s.active_graph_id = Some("other".into());
        let outcome = execute(&s, &spec(), "g1", "cid-1");
        assert_eq!(outcome.actions[0].action, ActionKind::OpenGraph);
        assert_eq!(outcome.actions[0].params[0], "g1");
    }
}
