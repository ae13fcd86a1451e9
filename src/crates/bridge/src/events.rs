//! Append-only event log
//!
//! A bounded in-memory ring with a monotone sequence number and broadcast
//! fan-out. Appends never block on subscribers: delivery rides a lossy
//! broadcast channel, so a slow or dead subscriber lags (and later resyncs
//! via [`EventLog::replay_since`]) without affecting anyone else.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Coarse event types recorded at pipeline boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    GoalEnqueued,
    TaskEnqueued,
    TaskFailed,
    PatchSubmitted,
    ReviewEnqueued,
    PatchApplied,
    PatchRejected,
    PendingActionsEnqueued,
    Telemetry,
    Chat,
}

impl EventKind {
    /// Wire name of this kind, used as the SSE event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GoalEnqueued => "GOAL_ENQUEUED",
            EventKind::TaskEnqueued => "TASK_ENQUEUED",
            EventKind::TaskFailed => "TASK_FAILED",
            EventKind::PatchSubmitted => "PATCH_SUBMITTED",
            EventKind::ReviewEnqueued => "REVIEW_ENQUEUED",
            EventKind::PatchApplied => "PATCH_APPLIED",
            EventKind::PatchRejected => "PATCH_REJECTED",
            EventKind::PendingActionsEnqueued => "PENDING_ACTIONS_ENQUEUED",
            EventKind::Telemetry => "TELEMETRY",
            EventKind::Chat => "CHAT",
        }
    }
}

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    pub seq: u64,
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Bounded append-only event log with subscriber fan-out.
pub struct EventLog {
    entries: Mutex<VecDeque<EventEntry>>,
    cap: usize,
    seq: AtomicU64,
    tx: broadcast::Sender<EventEntry>,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap,
            seq: AtomicU64::new(0),
            tx,
        }
    }

    /// Append an entry: stamps timestamp and sequence, trims the ring, and
    /// delivers to every live subscriber best-effort.
    pub fn append(&self, kind: EventKind, payload: Value) -> EventEntry {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        let entry = EventEntry {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ts: graphmodel::now_ms(),
            kind,
            payload,
        };

        {
            let mut entries = self.entries.lock();
            entries.push_back(entry.clone());
            while entries.len() > self.cap {
                entries.pop_front();
            }
        }

        // Fan-out is lossy on purpose: no subscriber may block an append.
        let _ = self.tx.send(entry.clone());
        entry
    }

    /// Subscribe to every subsequent append.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEntry> {
        self.tx.subscribe()
    }

    /// Entries with `seq >= since`, oldest first.
    pub fn replay_since(&self, since: u64) -> Vec<EventEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.seq >= since)
            .cloned()
            .collect()
    }

    /// The most recent `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<EventEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Next sequence number to be assigned.
    pub fn next_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}
