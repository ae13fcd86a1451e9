//! Safety drainer
//!
//! A 1 Hz belt-and-suspenders path: when the committer stalls, approved
//! reviews are applied directly so the UI keeps moving. Both paths share
//! the applied-id set, so whichever consumes a patch first wins and the
//! other skips it.

use crate::committer::AppliedSet;
use crate::events::{EventKind, EventLog};
use crate::outbox::ActionOutbox;
use crate::queue::{names, PullOptions, QueueManager};
use graphmodel::{PendingAction, Review};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DRAIN_BATCH: usize = 5;

/// Background drainer over approved reviews.
pub struct SafetyDrainer {
    queues: Arc<QueueManager>,
    outbox: Arc<ActionOutbox>,
    events: Arc<EventLog>,
    drained: Arc<AppliedSet>,
}

impl SafetyDrainer {
    pub fn new(
        queues: Arc<QueueManager>,
        outbox: Arc<ActionOutbox>,
        events: Arc<EventLog>,
        drained: Arc<AppliedSet>,
    ) -> Self {
        Self {
            queues,
            outbox,
            events,
            drained,
        }
    }

    /// One drain pass. Uses the filtered pull pattern: only reviews whose
    /// payload says `approved` are leased; everything else stays queued for
    /// the committer.
    pub fn tick(&self) {
        let approved_filter =
            |payload: &Value| payload["reviewStatus"].as_str() == Some("approved");
        let items = self.queues.pull(
            names::REVIEWS,
            &PullOptions::max(DRAIN_BATCH),
            Some(&approved_filter),
        );

        for item in items {
            let lease = item.lease_id.clone().unwrap_or_default();
            match serde_json::from_value::<Review>(item.payload.clone()) {
                Ok(review) => {
                    for patch in review.all_patches() {
                        if patch.ops.is_empty() {
                            continue;
                        }
                        // First consumer wins; the committer checks the same set.
                        if !self.drained.insert(&patch.patch_id) {
                            continue;
                        }
                        tracing::info!(patch = %patch.patch_id, graph = %patch.graph_id, "drainer applying stalled patch");
                        self.outbox
                            .enqueue_bundle(vec![PendingAction::apply_mutations(
                                patch.ops.clone(),
                            )]);
                        self.events.append(
                            EventKind::PatchApplied,
                            json!({
                                "graphId": patch.graph_id,
                                "opsCount": patch.ops.len(),
                                "via": "drainer",
                            }),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "drainer acking unparseable review");
                }
            }
            self.queues.ack(names::REVIEWS, &lease);
        }
    }

    /// Spawn the 1 Hz timer loop.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick(),
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryRing;
    use graphmodel::{GraphInit, Op, Patch};

    fn drainer() -> SafetyDrainer {
        let events = Arc::new(EventLog::new(100));
        let telemetry = Arc::new(TelemetryRing::new(100));
        SafetyDrainer::new(
            Arc::new(QueueManager::new(Duration::from_secs(30), 5)),
            Arc::new(ActionOutbox::new(Arc::clone(&events), telemetry)),
            events,
            Arc::new(AppliedSet::new(1000)),
        )
    }

    fn patch(name: &str) -> Patch {
        let id = graphmodel::fresh_id("graph");
        Patch::new(
            id.clone(),
            vec![Op::CreateNewGraph {
                initial_data: GraphInit::new(id, name),
            }],
        )
    }

    #[test]
    fn test_drains_approved_review() {
        let d = drainer();
        let review = Review::approved(patch("Stalled"));
        d.queues.enqueue(
            names::REVIEWS,
            serde_json::to_value(&review).unwrap(),
            None,
        );

        d.tick();
        let actions = d.outbox.snapshot();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action, graphmodel::ActionKind::ApplyMutations);
        assert_eq!(d.queues.metrics(names::REVIEWS).depth, 0);
    }

    #[test]
    fn test_skips_rejected_reviews() {
        let d = drainer();
        let review = Review::rejected(patch("Nope"), vec!["bad".into()]);
        d.queues.enqueue(
            names::REVIEWS,
            serde_json::to_value(&review).unwrap(),
            None,
        );

        d.tick();
        assert!(d.outbox.snapshot().is_empty());
        // Filter-false items stay queued for the committer.
        assert_eq!(d.queues.metrics(names::REVIEWS).depth, 1);
    }

    #[test]
    fn test_no_double_apply_with_shared_set() {
        let d = drainer();
        let p = patch("Once");
        d.drained.insert(&p.patch_id); // committer already applied it
        let review = Review::approved(p);
        d.queues.enqueue(
            names::REVIEWS,
            serde_json::to_value(&review).unwrap(),
            None,
        );

        d.tick();
        assert!(d.outbox.snapshot().is_empty(), "already-applied patch must be skipped");
        assert_eq!(d.queues.metrics(names::REVIEWS).depth, 0, "review still acked");
    }

    #[test]
    fn test_empty_ops_not_emitted() {
        let d = drainer();
        let review = Review::approved(Patch::new("g1", vec![]));
        d.queues.enqueue(
            names::REVIEWS,
            serde_json::to_value(&review).unwrap(),
            None,
        );
        d.tick();
        assert!(d.outbox.snapshot().is_empty());
    }
}
