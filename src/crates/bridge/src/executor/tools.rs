//! Tool implementations
//!
//! Each tool reads the projected snapshot and produces ops. Reads never
//! mutate: they come back as `readResponse` ops that the committer routes to
//! chat instead of the canvas.

use graphmodel::{
    fresh_id, EdgeInit, GraphInit, Op, Patch, Position, ProjectedStore, PrototypeInit, Task,
    ToolName,
};
use serde_json::{json, Value};

const DEFAULT_NODE_COLOR: &str = "#5B6CFF";

/// Evaluate one task against the snapshot and synthesize its patch.
///
/// The patch targets the task's graph when one is named, the active graph
/// otherwise, and a fresh id for graph-creating tools.
pub fn execute_tool(task: &Task, store: Option<&ProjectedStore>) -> Patch {
    let patch = match &task.tool_name {
        ToolName::CreateGraph => create_graph(task),
        ToolName::CreateNode => create_node(task, store),
        ToolName::CreateSubgraph | ToolName::CreatePopulatedGraph => populated_graph(task),
        ToolName::DefineConnections => define_connections(task, store),
        ToolName::VerifyState => read_response(task, store, verify_state(store)),
        ToolName::ListAvailableGraphs => read_response(task, store, list_graphs(store)),
        ToolName::GetGraphInstances => {
            let data = graph_instances(task, store);
            read_response(task, store, data)
        }
        ToolName::ReadGraphStructure => {
            let data = graph_structure(task, store);
            read_response(task, store, data)
        }
        ToolName::IdentifyPatterns => {
            let data = identify_patterns(task, store);
            read_response(task, store, data)
        }
        ToolName::Other(name) => {
            tracing::warn!(tool = %name, task = %task.id, "unknown tool; returning read error");
            read_response(
                task,
                store,
                json!({"error": format!("unknown tool: {}", name)}),
            )
        }
    };
    patch.with_thread(task.thread_id.clone())
}

fn tool_tag(task: &Task) -> String {
    serde_json::to_value(&task.tool_name)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string())
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// Target graph for an op-producing tool: explicit arg, else active graph.
fn target_graph(task: &Task, store: Option<&ProjectedStore>) -> Option<String> {
    arg_str(&task.args, "graphId")
        .or_else(|| arg_str(&task.args, "graph_id"))
        .map(String::from)
        .or_else(|| store.and_then(|s| s.active_graph_id.clone()))
}

fn read_response(task: &Task, store: Option<&ProjectedStore>, data: Value) -> Patch {
    let op = Op::ReadResponse {
        tool_name: tool_tag(task),
        data,
    };
    // Reads still carry a graph id so partition ordering holds per graph.
    let graph_id = target_graph(task, store).unwrap_or_else(|| "_reads".to_string());
    Patch::new(graph_id, vec![op])
}

fn create_graph(task: &Task) -> Patch {
    let name = arg_str(&task.args, "name").unwrap_or("Untitled Graph");
    let graph_id = fresh_id("graph");
    let op = Op::CreateNewGraph {
        initial_data: GraphInit::new(graph_id.clone(), name),
    };
    Patch::new(graph_id, vec![op])
}

fn create_node(task: &Task, store: Option<&ProjectedStore>) -> Patch {
    let name = arg_str(&task.args, "name").unwrap_or("Untitled");
    let graph_id = target_graph(task, store)
        .unwrap_or_else(|| graphmodel::graph_placeholder("Untitled Graph"));

    let mut ops = Vec::new();
    // Reuse an existing prototype with this name; mint one otherwise.
    let prototype_id = match store.and_then(|s| s.prototype_by_name(name)) {
        Some(proto) => proto.id.clone(),
        None => {
            let id = fresh_id("proto");
            let color = arg_str(&task.args, "color").unwrap_or(DEFAULT_NODE_COLOR);
            ops.push(Op::AddNodePrototype {
                prototype_data: PrototypeInit::new(id.clone(), name).with_color(color),
            });
            id
        }
    };

    let x = task.args.get("x").and_then(|v| v.as_f64()).unwrap_or(520.0);
    let y = task.args.get("y").and_then(|v| v.as_f64()).unwrap_or(320.0);
    ops.push(Op::AddNodeInstance {
        graph_id: graph_id.clone(),
        prototype_id,
        position: Position::new(x.max(320.0), y.max(100.0)),
        instance_id: fresh_id("inst"),
    });
    Patch::new(graph_id, ops)
}

/// Build a whole graph in one patch: graph, prototypes, instances on a
/// circle, then edges between the new instances.
fn populated_graph(task: &Task) -> Patch {
    let name = arg_str(&task.args, "name").unwrap_or("Untitled Graph");
    let graph_id = fresh_id("graph");
    let mut ops = vec![Op::CreateNewGraph {
        initial_data: GraphInit::new(graph_id.clone(), name),
    }];

    let nodes: Vec<Value> = task
        .args
        .get("nodes")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let count = nodes.len().max(1);
    let mut instance_ids: Vec<(String, String)> = Vec::new(); // (node name, instance id)

    for (index, node) in nodes.iter().enumerate() {
        let node_name = node
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled");
        let color = node
            .get("color")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_NODE_COLOR);
        let prototype_id = fresh_id("proto");
        ops.push(Op::AddNodePrototype {
            prototype_data: PrototypeInit::new(prototype_id.clone(), node_name).with_color(color),
        });

        let angle = 2.0 * std::f64::consts::PI * index as f64 / count as f64;
        let instance_id = fresh_id("inst");
        ops.push(Op::AddNodeInstance {
            graph_id: graph_id.clone(),
            prototype_id,
            position: Position::new(520.0 + 180.0 * angle.cos(), 320.0 + 180.0 * angle.sin()),
            instance_id: instance_id.clone(),
        });
        instance_ids.push((node_name.to_string(), instance_id));
    }

    let edges: Vec<Value> = task
        .args
        .get("edges")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    for edge in edges {
        let source = edge.get("source").and_then(|v| v.as_str()).unwrap_or("");
        let target = edge.get("target").and_then(|v| v.as_str()).unwrap_or("");
        let find = |name: &str| {
            instance_ids
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, id)| id.clone())
        };
        if let (Some(source_id), Some(dest_id)) = (find(source), find(target)) {
            let mut init = EdgeInit::directed(fresh_id("edge"), source_id, dest_id);
            if let Some(kind) = edge.get("type").and_then(|v| v.as_str()) {
                init = init.with_name(kind);
            }
            ops.push(Op::AddEdge {
                graph_id: graph_id.clone(),
                edge_data: init,
            });
        }
    }

    Patch::new(graph_id, ops)
}

fn define_connections(task: &Task, store: Option<&ProjectedStore>) -> Patch {
    let graph_id = target_graph(task, store)
        .unwrap_or_else(|| graphmodel::graph_placeholder("Untitled Graph"));
    let mut ops = Vec::new();

    let resolve = |name: &str| -> Option<String> {
        let store = store?;
        let graph = store.graph(&graph_id)?;
        let proto = store.prototype_by_name(name)?;
        graph
            .instances
            .iter()
            .find(|(_, inst)| inst.prototype_id == proto.id)
            .map(|(id, _)| id.clone())
    };

    if let Some(edges) = task.args.get("edges").and_then(|v| v.as_array()) {
        for edge in edges {
            let source = edge.get("source").and_then(|v| v.as_str()).unwrap_or("");
            let target = edge.get("target").and_then(|v| v.as_str()).unwrap_or("");
            if let (Some(source_id), Some(dest_id)) = (resolve(source), resolve(target)) {
                let mut init = EdgeInit::directed(fresh_id("edge"), source_id, dest_id);
                if let Some(kind) = edge.get("type").and_then(|v| v.as_str()) {
                    init = init.with_name(kind);
                }
                ops.push(Op::AddEdge {
                    graph_id: graph_id.clone(),
                    edge_data: init,
                });
            }
        }
    }
    Patch::new(graph_id, ops)
}

/// Snapshot digest used by `verify_state` and the MCP shim.
pub fn verify_state(store: Option<&ProjectedStore>) -> Value {
    match store {
        None => json!({"hasStore": false}),
        Some(store) => {
            let active = store
                .active_graph_id
                .as_deref()
                .and_then(|id| store.graph_digest(id, 10));
            json!({
                "hasStore": true,
                "graphCount": store.graphs.len(),
                "prototypeCount": store.node_prototypes.len(),
                "activeGraphId": store.active_graph_id,
                "openGraphIds": store.open_graph_ids,
                "activeGraphDigest": active,
            })
        }
    }
}

/// Graph listing used by `list_available_graphs` and the MCP shim.
pub fn list_graphs(store: Option<&ProjectedStore>) -> Value {
    let graphs: Vec<Value> = store
        .map(|s| {
            s.graphs
                .iter()
                .map(|g| {
                    json!({
                        "id": g.id,
                        "name": g.name,
                        "instanceCount": g.count_instances(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({"graphs": graphs})
}

fn graph_instances(task: &Task, store: Option<&ProjectedStore>) -> Value {
    let Some(store) = store else {
        return json!({"error": "no store snapshot yet"});
    };
    let Some(graph_id) = target_graph(task, Some(store)) else {
        return json!({"error": "no graph specified and none active"});
    };
    let Some(graph) = store.graph(&graph_id) else {
        return json!({"error": format!("unknown graph: {}", graph_id)});
    };
    let instances: Vec<Value> = graph
        .instances
        .iter()
        .map(|(id, inst)| {
            let name = store
                .prototype(&inst.prototype_id)
                .map(|p| p.name.as_str())
                .unwrap_or(inst.prototype_id.as_str());
            json!({"id": id, "name": name, "prototypeId": inst.prototype_id, "x": inst.x, "y": inst.y})
        })
        .collect();
    json!({"graphId": graph_id, "name": graph.name, "instances": instances})
}

fn graph_structure(task: &Task, store: Option<&ProjectedStore>) -> Value {
    let Some(store) = store else {
        return json!({"error": "no store snapshot yet"});
    };
    let Some(graph_id) = target_graph(task, Some(store)) else {
        return json!({"error": "no graph specified and none active"});
    };
    let Some(graph) = store.graph(&graph_id) else {
        return json!({"error": format!("unknown graph: {}", graph_id)});
    };
    let nodes: Vec<Value> = graph
        .instances
        .iter()
        .map(|(id, inst)| {
            let name = store
                .prototype(&inst.prototype_id)
                .map(|p| p.name.as_str())
                .unwrap_or(inst.prototype_id.as_str());
            json!({"id": id, "name": name})
        })
        .collect();
    json!({
        "graphId": graph_id,
        "name": graph.name,
        "nodeCount": nodes.len(),
        "edgeCount": graph.edge_ids.len(),
        "nodes": nodes,
        "edges": graph.edge_ids,
    })
}

fn identify_patterns(task: &Task, store: Option<&ProjectedStore>) -> Value {
    let Some(store) = store else {
        return json!({"error": "no store snapshot yet"});
    };
    let Some(graph_id) = target_graph(task, Some(store)) else {
        return json!({"error": "no graph specified and none active"});
    };
    let Some(graph) = store.graph(&graph_id) else {
        return json!({"error": format!("unknown graph: {}", graph_id)});
    };
    let tally = graph.prototype_tally();
    let dominant: Vec<Value> = tally
        .iter()
        .take(5)
        .map(|(proto_id, count)| {
            let name = store
                .prototype(proto_id)
                .map(|p| p.name.as_str())
                .unwrap_or(proto_id.as_str());
            json!({"prototype": name, "count": count})
        })
        .collect();
    json!({
        "graphId": graph_id,
        "instanceCount": graph.count_instances(),
        "edgeCount": graph.edge_ids.len(),
        "distinctPrototypes": tally.len(),
        "dominantPrototypes": dominant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmodel::{GraphSnapshot, InstanceSnapshot, PrototypeSnapshot, TaskSpec};
    use std::collections::HashMap;

    fn task(tool: ToolName, args: Value) -> Task {
        Task::from_spec(&TaskSpec::new(tool).with_args(args), "thread-1")
    }

    fn store_with_graph() -> ProjectedStore {
        let mut instances = HashMap::new();
        instances.insert(
            "i1".to_string(),
            InstanceSnapshot {
                prototype_id: "p1".into(),
                x: 100.0,
                y: 100.0,
            },
        );
        ProjectedStore {
            graphs: vec![GraphSnapshot {
                id: "g1".into(),
                name: "Kitchen".into(),
                instances,
                ..Default::default()
            }],
            node_prototypes: vec![PrototypeSnapshot {
                id: "p1".into(),
                name: "Flour".into(),
                ..Default::default()
            }],
            active_graph_id: Some("g1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_graph_yields_create_op() {
        let patch = execute_tool(
            &task(ToolName::CreateGraph, json!({"name": "Breaking Bad"})),
            None,
        );
        assert_eq!(patch.ops.len(), 1);
        let init = patch.ops[0].created_graph().unwrap();
        assert_eq!(init.name, "Breaking Bad");
        assert_eq!(patch.graph_id, init.id);
        assert_eq!(patch.thread_id.as_deref(), Some("thread-1"));
    }

    #[test]
    fn test_create_node_reuses_existing_prototype() {
        let store = store_with_graph();
        let patch = execute_tool(
            &task(ToolName::CreateNode, json!({"name": "Flour"})),
            Some(&store),
        );
        // No new prototype: only the instance op.
        assert_eq!(patch.ops.len(), 1);
        assert!(patch.ops[0].is_instance_add());
    }

    #[test]
    fn test_create_node_mints_prototype_and_clamps() {
        let store = store_with_graph();
        let patch = execute_tool(
            &task(ToolName::CreateNode, json!({"name": "Sugar", "x": 10, "y": 20})),
            Some(&store),
        );
        assert_eq!(patch.ops.len(), 2);
        match &patch.ops[1] {
            Op::AddNodeInstance { position, .. } => {
                assert_eq!(position.x, 320.0);
                assert_eq!(position.y, 100.0);
            }
            other => panic!("expected addNodeInstance, got {:?}", other),
        }
    }

    #[test]
    fn test_read_tools_yield_single_read_response() {
        let store = store_with_graph();
        for tool in [
            ToolName::VerifyState,
            ToolName::ListAvailableGraphs,
            ToolName::GetGraphInstances,
            ToolName::ReadGraphStructure,
            ToolName::IdentifyPatterns,
        ] {
            let patch = execute_tool(&task(tool, Value::Null), Some(&store));
            assert_eq!(patch.ops.len(), 1);
            assert!(patch.ops[0].is_read_response());
        }
    }

    #[test]
    fn test_populated_graph_circle_and_edges() {
        let patch = execute_tool(
            &task(
                ToolName::CreatePopulatedGraph,
                json!({
                    "name": "Baking",
                    "nodes": [{"name": "Flour"}, {"name": "Eggs"}],
                    "edges": [{"source": "Flour", "target": "Eggs", "type": "mixes with"}],
                }),
            ),
            None,
        );
        // 1 graph + 2 prototypes + 2 instances + 1 edge
        assert_eq!(patch.ops.len(), 6);
        let edges: Vec<_> = patch.ops.iter().filter(|op| op.is_edge_add()).collect();
        assert_eq!(edges.len(), 1);

        // First instance sits at angle 0: (520 + 180, 320).
        let first = patch
            .ops
            .iter()
            .find_map(|op| match op {
                Op::AddNodeInstance { position, .. } => Some(*position),
                _ => None,
            })
            .unwrap();
        assert!((first.x - 700.0).abs() < 1e-6);
        assert!((first.y - 320.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_tool_reports_error() {
        let patch = execute_tool(
            &task(ToolName::Other("mystery".into()), Value::Null),
            None,
        );
        match &patch.ops[0] {
            Op::ReadResponse { data, .. } => {
                assert!(data["error"].as_str().unwrap().contains("mystery"));
            }
            other => panic!("expected readResponse, got {:?}", other),
        }
    }
}
