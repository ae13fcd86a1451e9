//! Projected store holder
//!
//! The UI posts whole snapshots; readers copy out what they need. Partial
//! updates exist only for per-graph layout data, which supports merge or
//! replace semantics.

use graphmodel::ProjectedStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// How `/api/bridge/layout` combines incoming layout data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Merge,
    Replace,
}

/// Shared holder for the latest UI snapshot.
#[derive(Default)]
pub struct StoreHandle {
    inner: RwLock<Option<ProjectedStore>>,
}

impl StoreHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replace; stamps `summary.lastUpdate`.
    pub fn replace(&self, mut store: ProjectedStore) {
        store.summary.last_update = graphmodel::now_ms();
        *self.inner.write() = Some(store);
    }

    /// Clone of the latest snapshot, if any has been posted yet.
    pub fn snapshot(&self) -> Option<ProjectedStore> {
        self.inner.read().clone()
    }

    pub fn has_store(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Merge or replace per-graph layout data. Creates an empty store if the
    /// UI pushes layouts before its first full snapshot.
    pub fn apply_layouts(&self, layouts: HashMap<String, Value>, mode: LayoutMode) {
        let mut guard = self.inner.write();
        let store = guard.get_or_insert_with(ProjectedStore::default);
        match mode {
            LayoutMode::Replace => {
                store.graph_layouts = layouts;
            }
            LayoutMode::Merge => {
                for (graph_id, incoming) in layouts {
                    let merged = match (store.graph_layouts.get_mut(&graph_id), &incoming) {
                        (Some(Value::Object(existing)), Value::Object(incoming_map)) => {
                            for (key, value) in incoming_map {
                                existing.insert(key.clone(), value.clone());
                            }
                            true
                        }
                        _ => false,
                    };
                    if !merged {
                        store.graph_layouts.insert(graph_id, incoming);
                    }
                }
            }
        }
        store.summary.last_update = graphmodel::now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_stamps_last_update() {
        let handle = StoreHandle::new();
        assert!(!handle.has_store());
        handle.replace(ProjectedStore::default());
        let snap = handle.snapshot().unwrap();
        assert!(snap.summary.last_update > 0);
    }

    #[test]
    fn test_layout_merge_keeps_existing_keys() {
        let handle = StoreHandle::new();
        let mut layouts = HashMap::new();
        layouts.insert("g1".to_string(), json!({"nodes": [1, 2], "metadata": {"zoom": 1}}));
        handle.apply_layouts(layouts, LayoutMode::Replace);

        let mut update = HashMap::new();
        update.insert("g1".to_string(), json!({"nodes": [3]}));
        handle.apply_layouts(update, LayoutMode::Merge);

        let snap = handle.snapshot().unwrap();
        let layout = &snap.graph_layouts["g1"];
        assert_eq!(layout["nodes"], json!([3]));
        assert_eq!(layout["metadata"]["zoom"], 1); // untouched by merge
    }

    #[test]
    fn test_layout_replace_drops_other_graphs() {
        let handle = StoreHandle::new();
        let mut layouts = HashMap::new();
        layouts.insert("g1".to_string(), json!({"nodes": []}));
        layouts.insert("g2".to_string(), json!({"nodes": []}));
        handle.apply_layouts(layouts, LayoutMode::Replace);

        let mut update = HashMap::new();
        update.insert("g1".to_string(), json!({"nodes": [1]}));
        handle.apply_layouts(update, LayoutMode::Replace);

        let snap = handle.snapshot().unwrap();
        assert_eq!(snap.graph_layouts.len(), 1);
    }
}
