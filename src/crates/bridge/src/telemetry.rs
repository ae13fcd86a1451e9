//! Correlation-tagged telemetry ring
//!
//! Every boundary crossing records a telemetry entry tagged with the chat
//! turn's correlation id (`cid`) so a conversation can be reconstructed
//! end-to-end. The ring is bounded; readers either poll with filters or
//! tail the broadcast stream over SSE.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Telemetry entry types. Open set: unknown tags pass through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    BridgeState,
    ToolCall,
    AgentPlan,
    AgentAnswer,
    AgentQueued,
    AgentRequest,
    ActionFeedback,
    IntentResolution,
    Chat,
    #[serde(untagged)]
    Other(String),
}

/// One telemetry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEntry {
    pub seq: u64,
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: TelemetryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// Poll-side filter over the ring.
#[derive(Debug, Clone, Default)]
pub struct TelemetryFilter {
    pub cid: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
}

impl TelemetryFilter {
    pub fn matches(&self, entry: &TelemetryEntry) -> bool {
        if let Some(cid) = &self.cid {
            if entry.cid.as_deref() != Some(cid.as_str()) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            let entry_kind = serde_json::to_value(&entry.kind)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            if entry_kind != *kind {
                return false;
            }
        }
        true
    }
}

/// Bounded telemetry ring with broadcast tail.
pub struct TelemetryRing {
    entries: Mutex<VecDeque<TelemetryEntry>>,
    cap: usize,
    seq: AtomicU64,
    tx: broadcast::Sender<TelemetryEntry>,
}

impl TelemetryRing {
    pub fn new(cap: usize) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap,
            seq: AtomicU64::new(0),
            tx,
        }
    }

    /// Record one entry, returning it stamped with seq and timestamp.
    pub fn record(&self, kind: TelemetryKind, cid: Option<String>, data: Value) -> TelemetryEntry {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        let entry = TelemetryEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ts: graphmodel::now_ms(),
            kind,
            cid,
            data,
        };

        {
            let mut entries = self.entries.lock();
            entries.push_back(entry.clone());
            while entries.len() > self.cap {
                entries.pop_front();
            }
        }

        let _ = self.tx.send(entry.clone());
        entry
    }

    /// Filtered snapshot, oldest first, truncated to `limit` newest entries.
    pub fn query(&self, filter: &TelemetryFilter) -> Vec<TelemetryEntry> {
        let entries = self.entries.lock();
        let matched: Vec<TelemetryEntry> = entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        let limit = filter.limit.unwrap_or(200);
        let skip = matched.len().saturating_sub(limit);
        matched.into_iter().skip(skip).collect()
    }

    /// Entries with `seq >= from`, oldest first; used by the SSE replay.
    pub fn replay_from(&self, from: u64) -> Vec<TelemetryEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.seq >= from)
            .cloned()
            .collect()
    }

    /// Subscribe to the live tail.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEntry> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(TelemetryKind::IntentResolution).unwrap(),
            "intent_resolution"
        );
        let parsed: TelemetryKind = serde_json::from_str("\"agent_request\"").unwrap();
        assert_eq!(parsed, TelemetryKind::AgentRequest);
        let unknown: TelemetryKind = serde_json::from_str("\"vendor_custom\"").unwrap();
        assert_eq!(unknown, TelemetryKind::Other("vendor_custom".to_string()));
    }

    #[test]
    fn test_cid_filter() {
        let ring = TelemetryRing::new(100);
        ring.record(TelemetryKind::AgentRequest, Some("cid-1".into()), json!({}));
        ring.record(TelemetryKind::AgentAnswer, Some("cid-2".into()), json!({}));
        ring.record(TelemetryKind::AgentQueued, Some("cid-1".into()), json!({}));

        let filter = TelemetryFilter {
            cid: Some("cid-1".into()),
            ..Default::default()
        };
        let hits = ring.query(&filter);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, TelemetryKind::AgentRequest);
    }

    #[test]
    fn test_type_filter_and_limit() {
        let ring = TelemetryRing::new(100);
        for i in 0..5 {
            ring.record(TelemetryKind::ToolCall, None, json!({"i": i}));
            ring.record(TelemetryKind::Chat, None, json!({"i": i}));
        }
        let filter = TelemetryFilter {
            kind: Some("tool_call".into()),
            limit: Some(3),
            ..Default::default()
        };
        let hits = ring.query(&filter);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.last().unwrap().data["i"], 4);
    }

    #[test]
    fn test_replay_from() {
        let ring = TelemetryRing::new(100);
        for _ in 0..4 {
            ring.record(TelemetryKind::Chat, None, json!({}));
        }
        assert_eq!(ring.replay_from(2).len(), 2);
    }
}
