//! Heuristic message handling
//!
//! Two concerns live here: the fallback intent classifier used when the
//! planner's JSON cannot be parsed, and the ordered side-paths that handle
//! unambiguous commands ("open X", "connect A to B") without a planner DAG.
//! Side-paths are matched in order; the earliest match wins, and every
//! mutation they produce goes through pending actions.

use crate::search::{search, SearchOptions};
use graphmodel::{fresh_id, EdgeInit, Op, PendingAction, Position, ProjectedStore};
use regex::Regex;
use serde_json::json;

/// Fallback intent from the verb/noun regex classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicIntent {
    CreateGraph,
    CreateNode,
    Qa,
}

const VERBS: &str = r"(?i)\b(add|create|make|place|insert|spawn|new)\b";
const GRAPH_NOUNS: &str = r"(?i)\b(graph|perspective|view)\b";
const NODE_NOUNS: &str = r"(?i)\b(node|concept|thing|idea)\b";

/// Classify a message when the planner's JSON is unusable.
pub fn classify(message: &str) -> HeuristicIntent {
    let verb = Regex::new(VERBS).unwrap().is_match(message);
    if !verb {
        return HeuristicIntent::Qa;
    }
    if Regex::new(GRAPH_NOUNS).unwrap().is_match(message) {
        HeuristicIntent::CreateGraph
    } else if Regex::new(NODE_NOUNS).unwrap().is_match(message) {
        HeuristicIntent::CreateNode
    } else {
        HeuristicIntent::Qa
    }
}

/// True when the message explicitly asks for a graph to be created.
pub fn wants_graph_creation(message: &str) -> bool {
    Regex::new(r"(?i)\b(create|make|new)\s+(?:a\s+|an\s+)?(graph|perspective|view)\b")
        .unwrap()
        .is_match(message)
}

/// True when the message mentions a node-like noun.
pub fn mentions_node_noun(message: &str) -> bool {
    Regex::new(NODE_NOUNS).unwrap().is_match(message)
}

/// Outcome of a matched side-path.
#[derive(Debug)]
pub struct SidePath {
    /// Reply text for the UI.
    pub reply: String,
    /// Pending actions to enqueue (may be empty for read-only paths).
    pub actions: Vec<PendingAction>,
    /// Tool tags reported back in the response.
    pub tool_calls: Vec<&'static str>,
}

impl SidePath {
    fn reply_only(reply: impl Into<String>, tool: &'static str) -> Self {
        Self {
            reply: reply.into(),
            actions: Vec::new(),
            tool_calls: vec![tool],
        }
    }
}

/// Find the instance id of the prototype named `name` in the given graph.
fn instance_of<'a>(
    store: &'a ProjectedStore,
    graph_id: &str,
    name: &str,
) -> Option<(String, &'a graphmodel::InstanceSnapshot)> {
    let graph = store.graph(graph_id)?;
    let proto = store.prototype_by_name(name)?;
    graph
        .instances
        .iter()
        .find(|(_, inst)| inst.prototype_id == proto.id)
        .map(|(id, inst)| (id.clone(), inst))
}

/// Try the ordered side-paths against a message. Returns `None` when no
/// path matches and the planner should handle the turn.
pub fn try_side_paths(message: &str, store: Option<&ProjectedStore>) -> Option<SidePath> {
    let trimmed = message.trim();

    // 1. Open graph by quoted or loose name.
    let open_re = Regex::new(r#"(?i)^open\s+(?:graph\s+)?["']?([^"']+?)["']?$"#).unwrap();
    if let Some(caps) = open_re.captures(trimmed) {
        let name = caps[1].trim();
        return Some(match store.and_then(|s| s.graph_by_name(name)) {
            Some(graph) => SidePath {
                reply: format!("Opening \"{}\".", graph.name),
                actions: vec![PendingAction::open_graph(graph.id.clone())],
                tool_calls: vec!["open_graph"],
            },
            None => SidePath::reply_only(
                format!("I couldn't find a graph named \"{}\".", name),
                "open_graph",
            ),
        });
    }

    // 2. List graphs.
    let list_re = Regex::new(r"(?i)\b(list|show)\b.*\bgraphs\b").unwrap();
    if list_re.is_match(trimmed) {
        let names: Vec<String> = store
            .map(|s| s.graphs.iter().map(|g| g.name.clone()).collect())
            .unwrap_or_default();
        let reply = if names.is_empty() {
            "There are no graphs yet.".to_string()
        } else {
            format!("Graphs: {}.", names.join(", "))
        };
        return Some(SidePath::reply_only(reply, "list_available_graphs"));
    }

    // 3. Search.
    let search_re = Regex::new(r#"(?i)^(?:search|find)\s+(?:for\s+)?["']?([^"']+?)["']?$"#).unwrap();
    if let Some(caps) = search_re.captures(trimmed) {
        let query = caps[1].trim();
        let reply = match store {
            Some(s) => {
                let hits = search(s, query, &SearchOptions::default()).unwrap_or_default();
                if hits.is_empty() {
                    format!("No matches for \"{}\".", query)
                } else {
                    let top: Vec<String> = hits
                        .iter()
                        .take(5)
                        .map(|h| format!("{} ({})", h.name, h.kind))
                        .collect();
                    format!("Found: {}.", top.join(", "))
                }
            }
            None => "I don't have a view of your graphs yet.".to_string(),
        };
        return Some(SidePath::reply_only(reply, "search_nodes"));
    }

    // 4. Rename the current graph. Must run before the generic rename.
    let rename_current_re =
        Regex::new(r#"(?i)\brename\s+(?:this|current)\s+graph\s+to\s+["']?([^"']+?)["']?$"#)
            .unwrap();
    if let Some(caps) = rename_current_re.captures(trimmed) {
        let new_name = caps[1].trim();
        let Some(graph_id) = store.and_then(|s| s.active_graph_id.clone()) else {
            return Some(SidePath::reply_only("No graph is open right now.", "update_graph"));
        };
        let op = Op::UpdateGraph {
            graph_id,
            updates: json!({"name": new_name}),
        };
        return Some(SidePath {
            reply: format!("Renamed the current graph to \"{}\".", new_name),
            actions: vec![PendingAction::apply_mutations(vec![op])],
            tool_calls: vec!["update_graph"],
        });
    }

    // 5. Connect A -> B, optionally labeled.
    let connect_re = Regex::new(
        r#"(?i)\bconnect\s+["']?([^"']+?)["']?\s+(?:to|->|→)\s+["']?([^"']+?)["']?(?:\s+as\s+["']?([^"']+?)["']?)?$"#,
    )
    .unwrap();
    if let Some(caps) = connect_re.captures(trimmed) {
        let (source, target) = (caps[1].trim(), caps[2].trim());
        let label = caps.get(3).map(|m| m.as_str().trim().to_string());
        let Some((store, graph_id)) = store.and_then(|s| s.active_graph_id.clone().map(|g| (s, g)))
        else {
            return Some(SidePath::reply_only("No graph is open right now.", "define_connections"));
        };
        let Some((source_id, _)) = instance_of(store, &graph_id, source) else {
            return Some(SidePath::reply_only(
                format!("I couldn't find \"{}\" in the current graph.", source),
                "define_connections",
            ));
        };
        let Some((dest_id, _)) = instance_of(store, &graph_id, target) else {
            return Some(SidePath::reply_only(
                format!("I couldn't find \"{}\" in the current graph.", target),
                "define_connections",
            ));
        };
        let mut edge = EdgeInit::directed(fresh_id("edge"), source_id, dest_id);
        if let Some(label) = &label {
            edge = edge.with_name(label.clone());
        }
        let op = Op::AddEdge {
            graph_id,
            edge_data: edge,
        };
        let reply = match label {
            Some(label) => format!("Connected {} to {} as \"{}\".", source, target, label),
            None => format!("Connected {} to {}.", source, target),
        };
        return Some(SidePath {
            reply,
            actions: vec![PendingAction::apply_mutations(vec![op])],
            tool_calls: vec!["define_connections"],
        });
    }

    // 6. Move "N" to (x, y).
    let move_re = Regex::new(
        r#"(?i)\bmove\s+["']?([^"']+?)["']?\s+to\s+\(?\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*\)?"#,
    )
    .unwrap();
    if let Some(caps) = move_re.captures(trimmed) {
        let name = caps[1].trim();
        let x: f64 = caps[2].parse().unwrap_or(520.0);
        let y: f64 = caps[3].parse().unwrap_or(320.0);
        let Some((store, graph_id)) = store.and_then(|s| s.active_graph_id.clone().map(|g| (s, g)))
        else {
            return Some(SidePath::reply_only("No graph is open right now.", "move_node"));
        };
        let Some((instance_id, _)) = instance_of(store, &graph_id, name) else {
            return Some(SidePath::reply_only(
                format!("I couldn't find \"{}\" in the current graph.", name),
                "move_node",
            ));
        };
        let op = Op::MoveNodeInstance {
            graph_id,
            instance_id,
            position: Position::new(x, y),
        };
        return Some(SidePath {
            reply: format!("Moved \"{}\" to ({}, {}).", name, x, y),
            actions: vec![PendingAction::apply_mutations(vec![op])],
            tool_calls: vec!["move_node"],
        });
    }

    // 7. Delete "N".
    let delete_re = Regex::new(r#"(?i)^(?:delete|remove)\s+["']?([^"']+?)["']?$"#).unwrap();
    if let Some(caps) = delete_re.captures(trimmed) {
        let name = caps[1].trim();
        let Some((store, graph_id)) = store.and_then(|s| s.active_graph_id.clone().map(|g| (s, g)))
        else {
            return Some(SidePath::reply_only("No graph is open right now.", "remove_node"));
        };
        let Some((instance_id, _)) = instance_of(store, &graph_id, name) else {
            return Some(SidePath::reply_only(
                format!("I couldn't find \"{}\" in the current graph.", name),
                "remove_node",
            ));
        };
        let op = Op::RemoveNodeInstance {
            graph_id,
            instance_id,
        };
        return Some(SidePath {
            reply: format!("Removed \"{}\".", name),
            actions: vec![PendingAction::apply_mutations(vec![op])],
            tool_calls: vec!["remove_node"],
        });
    }

    // 8. Set color of "N" to #rrggbb.
    let color_re = Regex::new(
        r#"(?i)\b(?:set\s+)?colou?r\s+of\s+["']?([^"']+?)["']?\s+to\s+(#[0-9a-fA-F]{6})"#,
    )
    .unwrap();
    if let Some(caps) = color_re.captures(trimmed) {
        let name = caps[1].trim();
        let color = caps[2].to_string();
        let Some(proto) = store.and_then(|s| s.prototype_by_name(name)) else {
            return Some(SidePath::reply_only(
                format!("I couldn't find a concept named \"{}\".", name),
                "update_node",
            ));
        };
        let op = Op::UpdateNodePrototype {
            prototype_id: proto.id.clone(),
            updates: json!({"color": color}),
        };
        return Some(SidePath {
            reply: format!("Set \"{}\" to {}.", name, color),
            actions: vec![PendingAction::apply_mutations(vec![op])],
            tool_calls: vec!["update_node"],
        });
    }

    // 9. Rename "old" to "new" (prototype first, then graph).
    let rename_re =
        Regex::new(r#"(?i)\brename\s+["']?([^"']+?)["']?\s+to\s+["']?([^"']+?)["']?$"#).unwrap();
    if let Some(caps) = rename_re.captures(trimmed) {
        let (old, new) = (caps[1].trim(), caps[2].trim());
        if let Some(proto) = store.and_then(|s| s.prototype_by_name(old)) {
            let op = Op::UpdateNodePrototype {
                prototype_id: proto.id.clone(),
                updates: json!({"name": new}),
            };
            return Some(SidePath {
                reply: format!("Renamed \"{}\" to \"{}\".", old, new),
                actions: vec![PendingAction::apply_mutations(vec![op])],
                tool_calls: vec!["update_node"],
            });
        }
        if let Some(graph) = store.and_then(|s| s.graph_by_name(old)) {
            let op = Op::UpdateGraph {
                graph_id: graph.id.clone(),
                updates: json!({"name": new}),
            };
            return Some(SidePath {
                reply: format!("Renamed graph \"{}\" to \"{}\".", old, new),
                actions: vec![PendingAction::apply_mutations(vec![op])],
                tool_calls: vec!["update_graph"],
            });
        }
        return Some(SidePath::reply_only(
            format!("I couldn't find anything named \"{}\".", old),
            "update_node",
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphmodel::{GraphSnapshot, InstanceSnapshot, PrototypeSnapshot};
    use std::collections::HashMap;

    fn store() -> ProjectedStore {
        let mut instances = HashMap::new();
        instances.insert(
            "i-flour".to_string(),
            InstanceSnapshot {
                prototype_id: "p-flour".into(),
                x: 100.0,
                y: 100.0,
            },
        );
        instances.insert(
            "i-eggs".to_string(),
            InstanceSnapshot {
                prototype_id: "p-eggs".into(),
                x: 200.0,
                y: 200.0,
            },
        );
        ProjectedStore {
            graphs: vec![GraphSnapshot {
                id: "g1".into(),
                name: "Baking".into(),
                instances,
                ..Default::default()
            }],
            node_prototypes: vec![
                PrototypeSnapshot {
                    id: "p-flour".into(),
                    name: "Flour".into(),
                    ..Default::default()
                },
                PrototypeSnapshot {
                    id: "p-eggs".into(),
                    name: "Eggs".into(),
                    ..Default::default()
                },
            ],
            active_graph_id: Some("g1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classifier_verbs_and_nouns() {
        assert_eq!(classify("create a graph about jazz"), HeuristicIntent::CreateGraph);
        assert_eq!(classify("add a node for miles davis"), HeuristicIntent::CreateNode);
        assert_eq!(classify("make me a new perspective"), HeuristicIntent::CreateGraph);
        assert_eq!(classify("what does this graph mean?"), HeuristicIntent::Qa);
        assert_eq!(classify("place a concept here"), HeuristicIntent::CreateNode);
    }

    #[test]
    fn test_open_graph_by_name() {
        let s = store();
        let side = try_side_paths("open \"Baking\"", Some(&s)).unwrap();
        assert_eq!(side.actions.len(), 1);
        assert_eq!(side.actions[0].params[0], "g1");
        assert!(side.reply.contains("Baking"));
    }

    #[test]
    fn test_open_graph_loose_name() {
        let s = store();
        let side = try_side_paths("open graph baking", Some(&s)).unwrap();
        assert_eq!(side.actions[0].params[0], "g1");
    }

    #[test]
    fn test_open_unknown_graph_replies_only() {
        let s = store();
        let side = try_side_paths("open \"Cooking\"", Some(&s)).unwrap();
        assert!(side.actions.is_empty());
        assert!(side.reply.contains("couldn't find"));
    }

    #[test]
    fn test_list_graphs() {
        let s = store();
        let side = try_side_paths("list my graphs please", Some(&s)).unwrap();
        assert!(side.reply.contains("Baking"));
        assert!(side.actions.is_empty());
    }

    #[test]
    fn test_connect_with_label() {
        let s = store();
        let side = try_side_paths("connect Flour to Eggs as \"mixes with\"", Some(&s)).unwrap();
        assert_eq!(side.actions.len(), 1);
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "addEdge");
        assert_eq!(ops[0]["edgeData"]["name"], "mixes with");
        assert_eq!(
            ops[0]["edgeData"]["directionality"]["arrowsToward"][0],
            ops[0]["edgeData"]["destinationId"]
        );
    }

    #[test]
    fn test_move_node() {
        let s = store();
        let side = try_side_paths("move \"Flour\" to (400, 250)", Some(&s)).unwrap();
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "moveNodeInstance");
        assert_eq!(ops[0]["instanceId"], "i-flour");
        assert_eq!(ops[0]["position"]["x"], 400.0);
    }

    #[test]
    fn test_delete_node() {
        let s = store();
        let side = try_side_paths("delete \"Eggs\"", Some(&s)).unwrap();
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "removeNodeInstance");
        assert_eq!(ops[0]["instanceId"], "i-eggs");
    }

    #[test]
    fn test_set_color() {
        let s = store();
        let side = try_side_paths("set color of \"Flour\" to #ff8800", Some(&s)).unwrap();
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "updateNodePrototype");
        assert_eq!(ops[0]["updates"]["color"], "#ff8800");
    }

    #[test]
    fn test_rename_prototype_wins_over_graph() {
        let s = store();
        let side = try_side_paths("rename \"Flour\" to \"Bread Flour\"", Some(&s)).unwrap();
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "updateNodePrototype");
    }

    #[test]
    fn test_rename_current_graph_precedence() {
        let s = store();
        let side = try_side_paths("rename this graph to \"Pastry\"", Some(&s)).unwrap();
        let ops = side.actions[0].params[0].as_array().unwrap();
        assert_eq!(ops[0]["type"], "updateGraph");
        assert_eq!(ops[0]["graphId"], "g1");
        assert_eq!(ops[0]["updates"]["name"], "Pastry");
    }

    #[test]
    fn test_unmatched_message_falls_through() {
        let s = store();
        assert!(try_side_paths("tell me about breaking bad", Some(&s)).is_none());
        assert!(try_side_paths("create a graph called jazz", Some(&s)).is_none());
    }
}
