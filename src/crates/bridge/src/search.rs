//! In-memory search over the projected store
//!
//! A pure scoring function over the latest snapshot. The ladder: exact 100,
//! prefix 95, contains 80 scaled by length ratio (floor 80), subsequence 70,
//! then optional fuzzy via Levenshtein distance mapped into 0..60. Regex
//! mode replaces scoring with a boolean test at a constant 90.

use graphmodel::ProjectedStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Graphs,
    Prototypes,
    Instances,
    #[default]
    All,
}

/// Query options, mirroring the `/search` query string.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub scope: SearchScope,
    pub graph_id: Option<String>,
    pub limit: usize,
    pub regex: bool,
    pub fuzzy: bool,
    pub case_sensitive: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            scope: SearchScope::All,
            graph_id: None,
            limit: 50,
            regex: false,
            fuzzy: false,
            case_sensitive: false,
        }
    }
}

/// One scored hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub kind: &'static str,
    pub id: String,
    pub name: String,
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Score `haystack` against `query` per the ladder. 0 means no match.
pub fn score(query: &str, haystack: &str, fuzzy: bool, case_sensitive: bool) -> u32 {
    let (q, h) = if case_sensitive {
        (query.to_string(), haystack.to_string())
    } else {
        (query.to_lowercase(), haystack.to_lowercase())
    };
    if q.is_empty() || h.is_empty() {
        return 0;
    }
    if h == q {
        return 100;
    }
    if h.starts_with(&q) {
        return 95;
    }
    if h.contains(&q) {
        let scaled = 80.0 * q.chars().count() as f64 / 4.0_f64.max(h.chars().count() as f64);
        return scaled.max(80.0) as u32;
    }
    if is_subsequence(&q, &h) {
        return 70;
    }
    if fuzzy {
        let q_len = q.chars().count().min(64);
        let h_len = h.chars().count().min(64);
        let q64: String = q.chars().take(64).collect();
        let h64: String = h.chars().take(64).collect();
        let dist = levenshtein(&q64, &h64) as f64;
        let max_len = q_len.max(h_len) as f64;
        let similarity = (1.0 - dist / max_len).max(0.0);
        return (60.0 * similarity).round() as u32;
    }
    0
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = needle.chars().peekable();
    for c in haystack.chars() {
        if chars.peek() == Some(&c) {
            chars.next();
        }
    }
    chars.peek().is_none()
}

/// Two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Run a search over the snapshot. Returns scored hits sorted descending,
/// truncated to `options.limit`. Regex errors surface as `Err` so the HTTP
/// layer can answer 400.
pub fn search(
    store: &ProjectedStore,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>, regex::Error> {
    let matcher: Option<regex::Regex> = if options.regex {
        let pattern = if options.case_sensitive {
            query.to_string()
        } else {
            format!("(?i){}", query)
        };
        Some(regex::Regex::new(&pattern)?)
    } else {
        None
    };

    let score_of = |haystack: &str| -> u32 {
        match &matcher {
            Some(re) => {
                if re.is_match(haystack) {
                    90
                } else {
                    0
                }
            }
            None => score(query, haystack, options.fuzzy, options.case_sensitive),
        }
    };

    let mut results = Vec::new();
    let want = |scope: SearchScope| options.scope == scope || options.scope == SearchScope::All;

    if want(SearchScope::Graphs) {
        for graph in &store.graphs {
            let s = score_of(&graph.name);
            if s > 0 {
                results.push(SearchResult {
                    kind: "graph",
                    id: graph.id.clone(),
                    name: graph.name.clone(),
                    score: s,
                    graph_id: None,
                    extra: Some(json!({"instanceCount": graph.count_instances()})),
                });
            }
        }
    }

    if want(SearchScope::Prototypes) {
        for proto in &store.node_prototypes {
            let s = score_of(&proto.name);
            if s > 0 {
                results.push(SearchResult {
                    kind: "prototype",
                    id: proto.id.clone(),
                    name: proto.name.clone(),
                    score: s,
                    graph_id: None,
                    extra: proto.color.as_ref().map(|c| json!({"color": c})),
                });
            }
        }
    }

    if want(SearchScope::Instances) {
        for graph in &store.graphs {
            if let Some(only) = &options.graph_id {
                if &graph.id != only {
                    continue;
                }
            }
            for (instance_id, instance) in &graph.instances {
                // The instance haystack is its prototype's name.
                let name = store
                    .prototype(&instance.prototype_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| instance.prototype_id.clone());
                let s = score_of(&name);
                if s > 0 {
                    results.push(SearchResult {
                        kind: "instance",
                        id: instance_id.clone(),
                        name,
                        score: s,
                        graph_id: Some(graph.id.clone()),
                        extra: Some(json!({"x": instance.x, "y": instance.y})),
                    });
                }
            }
        }
    }

    results.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    results.truncate(options.limit);
    Ok(results)
}
