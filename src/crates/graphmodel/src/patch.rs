//! Patches and reviews
//!
//! A [`Patch`] is a candidate mutation set: an ordered list of ops plus the
//! idempotence key (`patchId`) and the optional `baseHash` the ops were
//! computed against. A [`Review`] is the auditor's verdict on one or more
//! patches, consumed by the committer.

use crate::op::Op;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form patch metadata. Known keys are typed; everything else rides in
/// `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMeta {
    /// API key forwarded for committer-driven continuations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Provider configuration forwarded alongside the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_config: Option<Value>,
    /// Marks a patch as part of an iterative agentic loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agentic_loop: Option<bool>,
    /// Iteration counter for agentic loops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A candidate mutation set targeting one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    /// Globally unique; a previously-seen id is acked and skipped.
    pub patch_id: String,
    /// Target graph; may be a `NEW_GRAPH:<name>` placeholder.
    pub graph_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Graph content hash the ops were computed against, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<String>,
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "PatchMeta::is_empty")]
    pub meta: PatchMeta,
}

impl PatchMeta {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none()
            && self.api_config.is_none()
            && self.agentic_loop.is_none()
            && self.iteration.is_none()
            && self.extra.is_empty()
    }
}

impl Patch {
    pub fn new(graph_id: impl Into<String>, ops: Vec<Op>) -> Self {
        Self {
            patch_id: crate::ids::fresh_id("patch"),
            graph_id: graph_id.into(),
            thread_id: None,
            base_hash: None,
            ops,
            meta: PatchMeta::default(),
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_base_hash(mut self, base_hash: impl Into<String>) -> Self {
        self.base_hash = Some(base_hash.into());
        self
    }

    pub fn with_meta(mut self, meta: PatchMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Review verdict on a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

/// The auditor's decision on one or more patches, queued for the committer.
///
/// `review_status` is optional on the wire: the committer treats a missing
/// status as not-approved rather than failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    pub graph_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patches: Option<Vec<Patch>>,
}

impl Review {
    /// An approved review wrapping a single patch.
    pub fn approved(patch: Patch) -> Self {
        Self {
            lease_id: None,
            review_status: Some(ReviewStatus::Approved),
            reasons: None,
            graph_id: patch.graph_id.clone(),
            patch: Some(patch),
            patches: None,
        }
    }

    /// A rejected review wrapping a single patch.
    pub fn rejected(patch: Patch, reasons: Vec<String>) -> Self {
        Self {
            lease_id: None,
            review_status: Some(ReviewStatus::Rejected),
            reasons: Some(reasons),
            graph_id: patch.graph_id.clone(),
            patch: Some(patch),
            patches: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.review_status == Some(ReviewStatus::Approved)
    }

    /// All patches carried by this review, whether singular or plural.
    pub fn all_patches(&self) -> Vec<&Patch> {
        match (&self.patch, &self.patches) {
            (Some(p), None) => vec![p],
            (None, Some(ps)) => ps.iter().collect(),
            (Some(p), Some(ps)) => std::iter::once(p).chain(ps.iter()).collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::GraphInit;

    fn sample_patch() -> Patch {
        Patch::new(
            "graph-1",
            vec![Op::CreateNewGraph {
                initial_data: GraphInit::new("graph-1", "Test"),
            }],
        )
    }

    #[test]
    fn test_patch_ids_unique() {
        assert_ne!(sample_patch().patch_id, sample_patch().patch_id);
    }

    #[test]
    fn test_review_status_wire_format() {
        let review = Review::approved(sample_patch());
        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["reviewStatus"], "approved");
        assert_eq!(json["graphId"], "graph-1");
    }

    #[test]
    fn test_review_missing_status_tolerated() {
        let json = r#"{"graphId":"g1","patch":{"patchId":"p1","graphId":"g1","ops":[]}}"#;
        let review: Review = serde_json::from_str(json).unwrap();
        assert!(!review.is_approved());
        assert_eq!(review.all_patches().len(), 1);
    }

    #[test]
    fn test_all_patches_plural() {
        let review = Review {
            lease_id: None,
            review_status: Some(ReviewStatus::Approved),
            reasons: None,
            graph_id: "g1".into(),
            patch: None,
            patches: Some(vec![sample_patch(), sample_patch()]),
        };
        assert_eq!(review.all_patches().len(), 2);
    }

    #[test]
    fn test_meta_skipped_when_empty() {
        let json = serde_json::to_value(sample_patch()).unwrap();
        assert!(json.get("meta").is_none());

        let mut patch = sample_patch();
        patch.meta.agentic_loop = Some(true);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["meta"]["agenticLoop"], true);
    }
}
