//! Planner response contract
//!
//! The planner call asks the model for STRICT JSON describing the turn:
//! intent, a short reply, and optionally a graph spec or tool calls. Models
//! wrap JSON in prose or code fences anyway, so parsing extracts the first
//! JSON object it can find before deserializing.

use serde::Deserialize;
use serde_json::Value;

/// Graph reference in a plan.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannedGraph {
    pub name: Option<String>,
}

/// Single-node request in a plan.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannedNode {
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub color: Option<String>,
}

/// One node of a graph spec.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecNode {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

/// One edge of a graph spec, endpoints by node name.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecEdge {
    pub source: String,
    pub target: String,
    #[serde(default, rename = "type")]
    pub edge_type: Option<String>,
}

/// Multi-node layout the planner can return for populate requests.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphSpec {
    pub nodes: Vec<SpecNode>,
    pub edges: Vec<SpecEdge>,
}

/// The planner's full verdict for one chat turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannedTurn {
    pub intent: Option<String>,
    pub response: Option<String>,
    pub questions: Option<Vec<String>>,
    pub graph: Option<PlannedGraph>,
    pub node: Option<PlannedNode>,
    pub graph_spec: Option<GraphSpec>,
    pub tool_calls: Option<Vec<Value>>,
}

impl PlannedTurn {
    pub fn intent(&self) -> &str {
        self.intent.as_deref().unwrap_or("qa")
    }
}

/// Extract the first JSON object from a model reply: a fenced ```json block
/// if present, else the first balanced `{...}` span.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim());
        }
    }
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            let inner = rest[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a planner reply into a [`PlannedTurn`], tolerating fences and
/// surrounding prose.
pub fn parse_planned(text: &str) -> Option<PlannedTurn> {
    let json = extract_json(text)?;
    match serde_json::from_str::<PlannedTurn>(json) {
        Ok(turn) => Some(turn),
        Err(e) => {
            tracing::warn!(error = %e, "planner JSON did not deserialize");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let turn = parse_planned(r#"{"intent":"create_graph","graph":{"name":"Breaking Bad"}}"#)
            .unwrap();
        assert_eq!(turn.intent(), "create_graph");
        assert_eq!(turn.graph.unwrap().name.as_deref(), Some("Breaking Bad"));
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let reply = "Sure! Here is the plan:\n```json\n{\"intent\":\"qa\",\"response\":\"It has 4 nodes.\"}\n```\nLet me know.";
        let turn = parse_planned(reply).unwrap();
        assert_eq!(turn.intent(), "qa");
        assert_eq!(turn.response.as_deref(), Some("It has 4 nodes."));
    }

    #[test]
    fn test_parse_embedded_object_with_nested_braces() {
        let reply = r#"The answer: {"intent":"create_node","graphSpec":{"nodes":[{"name":"Flour"}],"edges":[]}} hope that helps"#;
        let turn = parse_planned(reply).unwrap();
        let spec = turn.graph_spec.unwrap();
        assert_eq!(spec.nodes.len(), 1);
        assert_eq!(spec.nodes[0].name, "Flour");
    }

    #[test]
    fn test_parse_edge_type_field() {
        let turn = parse_planned(
            r#"{"graphSpec":{"nodes":[{"name":"A"},{"name":"B"}],"edges":[{"source":"A","target":"B","type":"mixes with"}]}}"#,
        )
        .unwrap();
        let spec = turn.graph_spec.unwrap();
        assert_eq!(spec.edges[0].edge_type.as_deref(), Some("mixes with"));
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_planned("no json here at all").is_none());
        assert!(parse_planned("{broken json").is_none());
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let reply = r#"{"intent":"qa","response":"use {curly} braces"}"#;
        let turn = parse_planned(reply).unwrap();
        assert_eq!(turn.response.as_deref(), Some("use {curly} braces"));
    }
}
