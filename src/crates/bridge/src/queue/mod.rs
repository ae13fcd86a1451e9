//! Durable-in-memory multi-queue
//!
//! Named FIFO queues with lease/ack semantics, partitioning, batching, and
//! depth metrics. Pulling from an unknown name creates it empty; queue
//! state is only ever mutated through this API.

mod fifo;

pub use fifo::{ItemStatus, Queue, QueueItem, QueueMetrics};

use crate::events::{EventKind, EventLog};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Well-known queue names of the orchestration pipeline.
pub mod names {
    pub const GOALS: &str = "goalQueue";
    pub const TASKS: &str = "taskQueue";
    pub const PATCHES: &str = "patchQueue";
    pub const REVIEWS: &str = "reviewQueue";
}

/// Options for a single pull.
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    pub partition_key: Option<String>,
    pub max: usize,
}

impl PullOptions {
    pub fn max(max: usize) -> Self {
        Self {
            partition_key: None,
            max,
        }
    }
}

/// Predicate over item payloads; items it rejects stay queued.
pub type PayloadFilter<'a> = Option<&'a (dyn Fn(&Value) -> bool + Send + Sync)>;

/// Registry of named queues with shared lease policy.
pub struct QueueManager {
    queues: DashMap<String, Arc<Queue>>,
    lease_ttl: Duration,
    max_attempts: u32,
}

impl QueueManager {
    pub fn new(lease_ttl: Duration, max_attempts: u32) -> Self {
        Self {
            queues: DashMap::new(),
            lease_ttl,
            max_attempts,
        }
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Queue::new(name)))
            .clone()
    }

    /// Append a payload and return the new item id.
    pub fn enqueue(&self, name: &str, payload: Value, partition_key: Option<String>) -> String {
        self.queue(name).enqueue(payload, partition_key)
    }

    /// Lease up to `opts.max` matching items.
    pub fn pull(&self, name: &str, opts: &PullOptions, filter: PayloadFilter) -> Vec<QueueItem> {
        self.queue(name).pull(
            opts.partition_key.as_deref(),
            opts.max,
            filter,
            self.lease_ttl.as_millis() as i64,
        )
    }

    /// Like [`QueueManager::pull`], but keeps collecting new arrivals for up
    /// to `window` before returning. The only intentional time-based
    /// suspension inside a tick.
    pub async fn pull_batch(
        &self,
        name: &str,
        window: Duration,
        max: usize,
        filter: PayloadFilter<'_>,
    ) -> Vec<QueueItem> {
        let deadline = tokio::time::Instant::now() + window;
        let mut collected = self.pull(name, &PullOptions::max(max), filter);

        while collected.len() < max {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let nap = (deadline - now).min(Duration::from_millis(25));
            tokio::time::sleep(nap).await;
            let more = self.pull(name, &PullOptions::max(max - collected.len()), filter);
            collected.extend(more);
        }
        collected
    }

    /// Ack by lease id. Unknown leases are a no-op.
    pub fn ack(&self, name: &str, lease_id: &str) -> bool {
        self.queue(name).ack(lease_id)
    }

    /// Return a leased item to its queue head, or dead-letter it after too
    /// many attempts.
    pub fn nack(&self, name: &str, lease_id: &str, requeue: bool) -> bool {
        self.queue(name).nack(lease_id, requeue, self.max_attempts)
    }

    /// Non-leasing snapshot of queued (and dead) items.
    pub fn peek(&self, name: &str, head: usize) -> Vec<QueueItem> {
        self.queue(name).peek(head)
    }

    pub fn metrics(&self, name: &str) -> QueueMetrics {
        self.queue(name).metrics()
    }

    /// Depths of every known queue, for scheduler status.
    pub fn depths(&self) -> Vec<(String, usize)> {
        let mut depths: Vec<(String, usize)> = self
            .queues
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().depth()))
            .collect();
        depths.sort_by(|a, b| a.0.cmp(&b.0));
        depths
    }

    /// Sweep expired leases on every queue, emitting dead-letter events to
    /// `events` for items that ran out of attempts.
    pub fn sweep(&self, events: &EventLog) {
        let now = graphmodel::now_ms();
        for entry in self.queues.iter() {
            let dead = entry.value().sweep_expired(now, self.max_attempts);
            for item in dead {
                let kind = if entry.key() == names::TASKS {
                    EventKind::TaskFailed
                } else {
                    EventKind::PatchRejected
                };
                tracing::warn!(queue = %entry.key(), item = %item.id, "dead-lettered after max attempts");
                events.append(
                    kind,
                    serde_json::json!({
                        "queue": entry.key(),
                        "itemId": item.id,
                        "attempts": item.attempts,
                        "reason": "max_attempts",
                    }),
                );
            }
        }
    }

    /// Spawn the background lease sweeper. Stops when `shutdown` resolves.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        events: Arc<EventLog>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.sweep(&events),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Low-level queue access, for tests only.
    pub fn get_queue(&self, name: &str) -> Arc<Queue> {
        self.queue(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> QueueManager {
        QueueManager::new(Duration::from_secs(30), 5)
    }

    #[test]
    fn test_pull_unknown_name_creates_empty() {
        let m = manager();
        assert!(m.pull("nowhere", &PullOptions::max(10), None).is_empty());
        assert_eq!(m.metrics("nowhere").depth, 0);
    }

    #[test]
    fn test_enqueue_pull_ack_cycle() {
        let m = manager();
        m.enqueue(names::GOALS, json!({"goal": "create_graph"}), None);
        let items = m.pull(names::GOALS, &PullOptions::max(10), None);
        assert_eq!(items.len(), 1);
        assert!(m.ack(names::GOALS, items[0].lease_id.as_ref().unwrap()));
        assert_eq!(m.metrics(names::GOALS).ack, 1);
    }

    #[tokio::test]
    async fn test_pull_batch_collects_late_arrivals() {
        let m = Arc::new(manager());
        m.enqueue(names::REVIEWS, json!({"n": 1}), None);

        let late = Arc::clone(&m);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            late.enqueue(names::REVIEWS, json!({"n": 2}), None);
        });

        let items = m
            .pull_batch(names::REVIEWS, Duration::from_millis(200), 10, None)
            .await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_pull_batch_returns_at_max() {
        let m = manager();
        for i in 0..3 {
            m.enqueue(names::REVIEWS, json!({"n": i}), None);
        }
        let start = std::time::Instant::now();
        let items = m
            .pull_batch(names::REVIEWS, Duration::from_secs(5), 3, None)
            .await;
        assert_eq!(items.len(), 3);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_depths_sorted() {
        let m = manager();
        m.enqueue(names::TASKS, json!({}), None);
        m.enqueue(names::GOALS, json!({}), None);
        m.enqueue(names::GOALS, json!({}), None);
        let depths = m.depths();
        assert_eq!(
            depths,
            vec![("goalQueue".to_string(), 2), ("taskQueue".to_string(), 1)]
        );
    }

    #[test]
    fn test_sweep_emits_dead_letter_events() {
        let m = QueueManager::new(Duration::from_millis(0), 1);
        let events = EventLog::new(100);
        m.enqueue(names::TASKS, json!({}), None);
        m.pull(names::TASKS, &PullOptions::max(1), None);

        std::thread::sleep(Duration::from_millis(5));
        m.sweep(&events);

        let tail = events.tail(10);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].kind, EventKind::TaskFailed);
        assert_eq!(tail[0].payload["reason"], "max_attempts");
    }
}
