//! Single named queue internals
//!
//! A FIFO of opaque payloads with lease state. Items move queued → leased
//! on pull, leave on ack, and return to the head of their partition on nack
//! or lease expiry (with `attempts` incremented). Items that exhaust their
//! attempts are parked as dead and kept visible for inspection.

use graphmodel::fresh_id;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

/// Lifecycle state of one queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Leased,
    Acked,
    Dead,
}

/// One enqueued payload with its lease envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub enqueued_at: i64,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<i64>,
    pub attempts: u32,
}

/// Counters surfaced by `/queue/metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub depth: usize,
    pub inflight: usize,
    pub enq: u64,
    pub deq: u64,
    pub ack: u64,
    pub nack: u64,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    inflight: HashMap<String, QueueItem>,
    dead: Vec<QueueItem>,
    enq: u64,
    deq: u64,
    ack: u64,
    nack: u64,
}

/// A single named FIFO queue.
pub struct Queue {
    name: String,
    state: Mutex<QueueState>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a payload; insertion order is preserved even under concurrent
    /// writers (the interior lock serializes appends).
    pub fn enqueue(&self, payload: Value, partition_key: Option<String>) -> String {
        let id = fresh_id("item");
        let item = QueueItem {
            id: id.clone(),
            enqueued_at: graphmodel::now_ms(),
            payload,
            partition_key,
            status: ItemStatus::Queued,
            lease_id: None,
            lease_expires_at: None,
            attempts: 0,
        };
        let mut state = self.state.lock();
        state.items.push_back(item);
        state.enq += 1;
        id
    }

    /// Lease up to `max` queued items matching the partition and filter.
    /// Filter-false items stay queued untouched; within a partition, leased
    /// items come out in enqueue order.
    pub fn pull(
        &self,
        partition_key: Option<&str>,
        max: usize,
        filter: Option<&(dyn Fn(&Value) -> bool + Send + Sync)>,
        lease_ttl_ms: i64,
    ) -> Vec<QueueItem> {
        if max == 0 {
            return Vec::new();
        }
        let now = graphmodel::now_ms();
        let mut state = self.state.lock();
        let mut leased = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.items.len());

        while let Some(mut item) = state.items.pop_front() {
            let partition_ok = match partition_key {
                Some(key) => item.partition_key.as_deref() == Some(key),
                None => true,
            };
            let filter_ok = filter.map(|f| f(&item.payload)).unwrap_or(true);

            if leased.len() < max && partition_ok && filter_ok {
                item.status = ItemStatus::Leased;
                item.lease_id = Some(fresh_id("lease"));
                item.lease_expires_at = Some(now + lease_ttl_ms);
                state
                    .inflight
                    .insert(item.lease_id.clone().unwrap(), item.clone());
                leased.push(item);
            } else {
                remaining.push_back(item);
            }
        }

        state.items = remaining;
        state.deq += leased.len() as u64;
        leased
    }

    /// Remove a leased item. Unknown lease ids are a no-op (idempotent ack).
    pub fn ack(&self, lease_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.inflight.remove(lease_id).is_some() {
            state.ack += 1;
            true
        } else {
            false
        }
    }

    /// Return a leased item to the head of the queue (or drop to dead if it
    /// has exhausted its attempts).
    pub fn nack(&self, lease_id: &str, requeue: bool, max_attempts: u32) -> bool {
        let mut state = self.state.lock();
        let Some(mut item) = state.inflight.remove(lease_id) else {
            return false;
        };
        state.nack += 1;
        item.lease_id = None;
        item.lease_expires_at = None;
        item.attempts += 1;

        if !requeue || item.attempts >= max_attempts {
            item.status = ItemStatus::Dead;
            state.dead.push(item);
        } else {
            item.status = ItemStatus::Queued;
            state.items.push_front(item);
        }
        true
    }

    /// Return expired leases to the head of their partition, incrementing
    /// `attempts`; items past `max_attempts` are parked dead and returned so
    /// the caller can emit dead-letter events.
    pub fn sweep_expired(&self, now: i64, max_attempts: u32) -> Vec<QueueItem> {
        let mut state = self.state.lock();
        let expired_ids: Vec<String> = state
            .inflight
            .iter()
            .filter(|(_, item)| item.lease_expires_at.map(|t| t < now).unwrap_or(false))
            .map(|(lease_id, _)| lease_id.clone())
            .collect();

        let mut dead = Vec::new();
        // Requeue newest-first so push_front restores original order.
        let mut expired: Vec<QueueItem> = expired_ids
            .iter()
            .filter_map(|lease_id| state.inflight.remove(lease_id))
            .collect();
        expired.sort_by_key(|item| std::cmp::Reverse(item.enqueued_at));

        for mut item in expired {
            item.lease_id = None;
            item.lease_expires_at = None;
            item.attempts += 1;
            if item.attempts >= max_attempts {
                item.status = ItemStatus::Dead;
                state.dead.push(item.clone());
                dead.push(item);
            } else {
                item.status = ItemStatus::Queued;
                state.items.push_front(item);
            }
        }
        dead
    }

    /// Non-leasing snapshot of the first `head` queued items, plus dead
    /// items for inspection.
    pub fn peek(&self, head: usize) -> Vec<QueueItem> {
        let state = self.state.lock();
        state
            .items
            .iter()
            .take(head)
            .cloned()
            .chain(state.dead.iter().take(head).cloned())
            .collect()
    }

    pub fn metrics(&self) -> QueueMetrics {
        let state = self.state.lock();
        QueueMetrics {
            depth: state.items.len(),
            inflight: state.inflight.len(),
            enq: state.enq,
            deq: state.deq,
            ack: state.ack,
            nack: state.nack,
        }
    }

    /// Queued depth only.
    pub fn depth(&self) -> usize {
        self.state.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: i64 = 30_000;

    #[test]
    fn test_fifo_order() {
        let q = Queue::new("test");
        q.enqueue(json!({"n": 1}), None);
        q.enqueue(json!({"n": 2}), None);
        q.enqueue(json!({"n": 3}), None);

        let items = q.pull(None, 2, None, TTL);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload["n"], 1);
        assert_eq!(items[1].payload["n"], 2);
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn test_pull_max_zero() {
        let q = Queue::new("test");
        q.enqueue(json!({}), None);
        assert!(q.pull(None, 0, None, TTL).is_empty());
        assert_eq!(q.metrics().inflight, 0);
    }

    #[test]
    fn test_partition_isolation_and_order() {
        let q = Queue::new("test");
        q.enqueue(json!({"n": 1}), Some("a".into()));
        q.enqueue(json!({"n": 2}), Some("b".into()));
        q.enqueue(json!({"n": 3}), Some("a".into()));

        let items = q.pull(Some("a"), 10, None, TTL);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload["n"], 1);
        assert_eq!(items[1].payload["n"], 3);
        // Partition b untouched.
        assert_eq!(q.depth(), 1);
    }

    #[test]
    fn test_filter_false_items_stay_queued() {
        let q = Queue::new("test");
        q.enqueue(json!({"keep": false}), None);
        q.enqueue(json!({"keep": true}), None);

        let filter = |p: &Value| p["keep"].as_bool().unwrap_or(false);
        let items = q.pull(None, 10, Some(&filter), TTL);
        assert_eq!(items.len(), 1);
        assert!(items[0].payload["keep"].as_bool().unwrap());
        assert_eq!(q.depth(), 1); // the false item is still queued
    }

    #[test]
    fn test_ack_removes_and_is_idempotent() {
        let q = Queue::new("test");
        q.enqueue(json!({}), None);
        let items = q.pull(None, 1, None, TTL);
        let lease = items[0].lease_id.clone().unwrap();

        assert!(q.ack(&lease));
        assert!(!q.ack(&lease)); // no-op on unknown lease
        assert_eq!(q.metrics().ack, 1);
        assert_eq!(q.metrics().inflight, 0);
    }

    #[test]
    fn test_nack_returns_to_head() {
        let q = Queue::new("test");
        q.enqueue(json!({"n": 1}), None);
        q.enqueue(json!({"n": 2}), None);

        let items = q.pull(None, 1, None, TTL);
        let lease = items[0].lease_id.clone().unwrap();
        q.nack(&lease, true, 5);

        let items = q.pull(None, 1, None, TTL);
        assert_eq!(items[0].payload["n"], 1);
        assert_eq!(items[0].attempts, 1);
    }

    #[test]
    fn test_lease_expiry_and_dead_letter() {
        let q = Queue::new("test");
        q.enqueue(json!({}), None);

        // Expire immediately with a negative TTL.
        let items = q.pull(None, 1, None, -1);
        assert_eq!(items.len(), 1);

        let dead = q.sweep_expired(graphmodel::now_ms(), 2);
        assert!(dead.is_empty());
        assert_eq!(q.depth(), 1);

        // Second expiry hits max_attempts.
        q.pull(None, 1, None, -1);
        let dead = q.sweep_expired(graphmodel::now_ms(), 2);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].status, ItemStatus::Dead);
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn test_peek_does_not_lease() {
        let q = Queue::new("test");
        q.enqueue(json!({"n": 1}), None);
        let peeked = q.peek(10);
        assert_eq!(peeked.len(), 1);
        assert_eq!(q.metrics().inflight, 0);
        assert_eq!(q.depth(), 1);
    }
}
