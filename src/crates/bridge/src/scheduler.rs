//! Cooperative orchestration scheduler
//!
//! A single ticker drains goals → tasks → patches → reviews with per-stage
//! per-tick caps. Ticks never overlap: if a tick is still running when the
//! cadence fires again, the firing is skipped. Stopping is cooperative; the
//! current tick drains to completion and no new tick begins.

use crate::events::{EventKind, EventLog};
use crate::executor::execute_tool;
use crate::queue::{names, PullOptions, QueueManager};
use crate::store::StoreHandle;
use crate::telemetry::{TelemetryKind, TelemetryRing};
use graphmodel::{Goal, Patch, Review, Task};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Which stages run on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerToggles {
    pub planner: bool,
    pub executor: bool,
    pub auditor: bool,
}

impl Default for SchedulerToggles {
    fn default() -> Self {
        Self {
            planner: true,
            executor: true,
            auditor: true,
        }
    }
}

/// Per-stage per-tick caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaxPerTick {
    pub planner: usize,
    pub executor: usize,
    pub auditor: usize,
}

impl Default for MaxPerTick {
    fn default() -> Self {
        Self {
            planner: 4,
            executor: 4,
            auditor: 8,
        }
    }
}

/// Body of `POST /orchestration/scheduler/start`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    pub cadence_ms: Option<u64>,
    pub toggles: Option<SchedulerToggles>,
    pub max_per_tick: Option<MaxPerTick>,
}

/// Snapshot returned by `GET /orchestration/scheduler/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub cadence_ms: u64,
    pub toggles: SchedulerToggles,
    pub max_per_tick: MaxPerTick,
    pub last_tick_at: Option<i64>,
    pub per_queue_depth: serde_json::Map<String, serde_json::Value>,
}

struct SchedulerState {
    enabled: bool,
    cadence: Duration,
    toggles: SchedulerToggles,
    max_per_tick: MaxPerTick,
    last_tick_at: Option<i64>,
    /// Tasks held back until their dependencies produce a patch or response.
    deferred: Vec<Task>,
    completed_tasks: HashSet<String>,
    completed_order: VecDeque<String>,
}

const COMPLETED_TASKS_CAP: usize = 10_000;

/// Review policy seam for the auditor stage.
pub trait AuditPolicy: Send + Sync {
    fn review(&self, patch: &Patch) -> Review;
}

/// The minimal policy: approve everything.
pub struct AutoApprove;

impl AuditPolicy for AutoApprove {
    fn review(&self, patch: &Patch) -> Review {
        Review::approved(patch.clone())
    }
}

/// Cooperative ticker over the goal/task/patch/review queues.
pub struct Scheduler {
    queues: Arc<QueueManager>,
    store: Arc<StoreHandle>,
    events: Arc<EventLog>,
    telemetry: Arc<TelemetryRing>,
    audit: Arc<dyn AuditPolicy>,
    state: Mutex<SchedulerState>,
    in_tick: AtomicBool,
}

impl Scheduler {
    pub fn new(
        queues: Arc<QueueManager>,
        store: Arc<StoreHandle>,
        events: Arc<EventLog>,
        telemetry: Arc<TelemetryRing>,
        cadence: Duration,
    ) -> Self {
        Self {
            queues,
            store,
            events,
            telemetry,
            audit: Arc::new(AutoApprove),
            state: Mutex::new(SchedulerState {
                enabled: false,
                cadence,
                toggles: SchedulerToggles::default(),
                max_per_tick: MaxPerTick::default(),
                last_tick_at: None,
                deferred: Vec::new(),
                completed_tasks: HashSet::new(),
                completed_order: VecDeque::new(),
            }),
            in_tick: AtomicBool::new(false),
        }
    }

    /// Install a non-default audit policy.
    pub fn with_audit_policy(mut self, policy: Arc<dyn AuditPolicy>) -> Self {
        self.audit = policy;
        self
    }

    /// Enable ticking, applying any option overrides.
    pub fn start(&self, options: StartOptions) {
        let mut state = self.state.lock();
        state.enabled = true;
        if let Some(ms) = options.cadence_ms {
            state.cadence = Duration::from_millis(ms.max(10));
        }
        if let Some(toggles) = options.toggles {
            state.toggles = toggles;
        }
        if let Some(caps) = options.max_per_tick {
            state.max_per_tick = caps;
        }
        tracing::info!(cadence_ms = state.cadence.as_millis() as u64, "scheduler started");
    }

    /// Disable ticking. The in-flight tick, if any, drains to completion.
    pub fn stop(&self) {
        self.state.lock().enabled = false;
        tracing::info!("scheduler stopped");
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock();
        let mut per_queue_depth = serde_json::Map::new();
        for (name, depth) in self.queues.depths() {
            per_queue_depth.insert(name, json!(depth));
        }
        SchedulerStatus {
            enabled: state.enabled,
            cadence_ms: state.cadence.as_millis() as u64,
            toggles: state.toggles,
            max_per_tick: state.max_per_tick,
            last_tick_at: state.last_tick_at,
            per_queue_depth,
        }
    }

    fn cadence(&self) -> Duration {
        self.state.lock().cadence
    }

    /// One cooperative tick: planner, executor, auditor, in that order.
    /// Public so tests can drive the pipeline without the timer.
    pub fn tick(&self) {
        if self.in_tick.swap(true, Ordering::SeqCst) {
            return; // previous tick still running; do not stack up
        }
        let (toggles, caps) = {
            let mut state = self.state.lock();
            state.last_tick_at = Some(graphmodel::now_ms());
            (state.toggles, state.max_per_tick)
        };

        if toggles.planner {
            self.planner_tick(caps.planner);
        }
        if toggles.executor {
            self.executor_tick(caps.executor);
        }
        if toggles.auditor {
            self.auditor_tick(caps.auditor);
        }

        self.in_tick.store(false, Ordering::SeqCst);
    }

    /// Release deferred tasks whose dependencies completed, then fan new
    /// goals out into tasks.
    fn planner_tick(&self, max: usize) {
        self.release_deferred();

        let goals = self
            .queues
            .pull(names::GOALS, &PullOptions::max(max), None);
        for item in goals {
            let lease = item.lease_id.clone().unwrap_or_default();
            match serde_json::from_value::<Goal>(item.payload.clone()) {
                Ok(goal) => self.plan_goal(&goal),
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "dropping unparseable goal");
                }
            }
            self.queues.ack(names::GOALS, &lease);
        }
    }

    fn plan_goal(&self, goal: &Goal) {
        let mut ready = Vec::new();
        let mut held = Vec::new();
        {
            let state = self.state.lock();
            for spec in &goal.dag {
                let task = Task::from_spec(spec, goal.thread_id.clone());
                let satisfied = task
                    .depends_on
                    .iter()
                    .all(|dep| state.completed_tasks.contains(dep));
                if satisfied {
                    ready.push(task);
                } else {
                    held.push(task);
                }
            }
        }

        for task in ready {
            self.enqueue_task(task);
        }
        if !held.is_empty() {
            self.state.lock().deferred.extend(held);
        }
    }

    fn release_deferred(&self) {
        let released: Vec<Task> = {
            let mut state = self.state.lock();
            let deferred = std::mem::take(&mut state.deferred);
            let (ready, still_held): (Vec<Task>, Vec<Task>) =
                deferred.into_iter().partition(|task| {
                    task.depends_on
                        .iter()
                        .all(|dep| state.completed_tasks.contains(dep))
                });
            state.deferred = still_held;
            ready
        };
        for task in released {
            self.enqueue_task(task);
        }
    }

    fn enqueue_task(&self, task: Task) {
        let payload = match serde_json::to_value(&task) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(task = %task.id, error = %e, "task serialization failed");
                return;
            }
        };
        self.queues
            .enqueue(names::TASKS, payload, Some(task.thread_id.clone()));
        self.events.append(
            EventKind::TaskEnqueued,
            json!({"taskId": task.id, "toolName": task.tool_name, "threadId": task.thread_id}),
        );
        self.telemetry.record(
            TelemetryKind::ToolCall,
            task.cid.clone(),
            json!({"taskId": task.id, "tool": task.tool_name, "status": "queued"}),
        );
    }

    /// Evaluate tasks against the snapshot and submit their patches.
    fn executor_tick(&self, max: usize) {
        let tasks = self
            .queues
            .pull(names::TASKS, &PullOptions::max(max), None);
        if tasks.is_empty() {
            return;
        }
        let snapshot = self.store.snapshot();

        for item in tasks {
            let lease = item.lease_id.clone().unwrap_or_default();
            match serde_json::from_value::<Task>(item.payload.clone()) {
                Ok(task) => {
                    let patch = execute_tool(&task, snapshot.as_ref());
                    self.submit_patch(&task, patch);
                    self.mark_completed(&task.id);
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "dropping unparseable task");
                }
            }
            self.queues.ack(names::TASKS, &lease);
        }
    }

    fn submit_patch(&self, task: &Task, patch: Patch) {
        let payload = match serde_json::to_value(&patch) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(patch = %patch.patch_id, error = %e, "patch serialization failed");
                return;
            }
        };
        self.queues
            .enqueue(names::PATCHES, payload, patch.thread_id.clone());
        self.events.append(
            EventKind::PatchSubmitted,
            json!({
                "patchId": patch.patch_id,
                "graphId": patch.graph_id,
                "opsCount": patch.ops.len(),
                "taskId": task.id,
            }),
        );
        self.telemetry.record(
            TelemetryKind::ToolCall,
            task.cid.clone(),
            json!({"taskId": task.id, "tool": task.tool_name, "status": "completed"}),
        );
    }

    fn mark_completed(&self, task_id: &str) {
        let mut state = self.state.lock();
        if state.completed_tasks.insert(task_id.to_string()) {
            state.completed_order.push_back(task_id.to_string());
            while state.completed_order.len() > COMPLETED_TASKS_CAP {
                if let Some(old) = state.completed_order.pop_front() {
                    state.completed_tasks.remove(&old);
                }
            }
        }
    }

    /// Review pending patches and queue the verdicts for the committer.
    fn auditor_tick(&self, max: usize) {
        let patches = self
            .queues
            .pull(names::PATCHES, &PullOptions::max(max), None);
        for item in patches {
            let lease = item.lease_id.clone().unwrap_or_default();
            match serde_json::from_value::<Patch>(item.payload.clone()) {
                Ok(patch) => {
                    let review = self.audit.review(&patch);
                    let payload = match serde_json::to_value(&review) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::error!(patch = %patch.patch_id, error = %e, "review serialization failed");
                            self.queues.ack(names::PATCHES, &lease);
                            continue;
                        }
                    };
                    self.queues
                        .enqueue(names::REVIEWS, payload, Some(review.graph_id.clone()));
                    self.events.append(
                        EventKind::ReviewEnqueued,
                        json!({
                            "patchId": patch.patch_id,
                            "graphId": review.graph_id,
                            "reviewStatus": review.review_status,
                        }),
                    );
                }
                Err(e) => {
                    tracing::warn!(item = %item.id, error = %e, "dropping unparseable patch");
                }
            }
            self.queues.ack(names::PATCHES, &lease);
        }
    }

    /// Spawn the timer loop. Uncaught tick problems are logged, never fatal.
    pub fn spawn(
        self: &Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let cadence = scheduler.cadence();
                tokio::select! {
                    _ = tokio::time::sleep(cadence) => {
                        if scheduler.is_enabled() {
                            scheduler.tick();
                        }
                    }
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
    use graphmodel::{GoalKind, TaskSpec, ToolName};
    use serde_json::json;

    fn scheduler() -> Scheduler {
        let queues = Arc::new(QueueManager::new(Duration::from_secs(30), 5));
        Scheduler::new(
            queues,
            Arc::new(StoreHandle::new()),
            Arc::new(EventLog::new(1000)),
            Arc::new(TelemetryRing::new(1000)),
            Duration::from_millis(250),
        )
    }

    fn enqueue_goal(s: &Scheduler, goal: &Goal) {
        s.queues.enqueue(
            names::GOALS,
            serde_json::to_value(goal).unwrap(),
            Some(goal.thread_id.clone()),
        );
    }

    #[test]
    fn test_goal_fans_out_to_tasks() {
        let s = scheduler();
        let goal = Goal::new(
            GoalKind::AnalyzeGraph,
            vec![
                TaskSpec::new(ToolName::VerifyState),
                TaskSpec::new(ToolName::ListAvailableGraphs),
            ],
            "thread-1",
        );
        enqueue_goal(&s, &goal);

        s.tick();
        assert_eq!(s.queues.metrics(names::GOALS).depth, 0);
        // Planner, executor, and auditor all run inside one tick, so both
        // tasks flow through to reviews immediately.
        assert_eq!(s.queues.metrics(names::TASKS).enq, 2);
        assert_eq!(s.queues.metrics(names::REVIEWS).depth, 2);
    }

    #[test]
    fn test_pipeline_reaches_reviews() {
        let s = scheduler();
        let goal = Goal::new(
            GoalKind::CreateGraph,
            vec![TaskSpec::new(ToolName::CreateGraph)
                .with_args(json!({"name": "Breaking Bad"}))],
            "thread-1",
        );
        enqueue_goal(&s, &goal);

        s.tick(); // goal -> task -> patch -> review, all in one tick
        assert_eq!(s.queues.metrics(names::REVIEWS).depth, 1);

        let reviews = s.queues.peek(names::REVIEWS, 10);
        let review: Review = serde_json::from_value(reviews[0].payload.clone()).unwrap();
        assert!(review.is_approved());
    }

    #[test]
    fn test_depends_on_holds_back_dependents() {
        let s = scheduler();
        let goal = Goal::new(
            GoalKind::AnalyzeGraph,
            vec![
                TaskSpec {
                    id: Some("t-first".into()),
                    ..TaskSpec::new(ToolName::VerifyState)
                },
                TaskSpec {
                    id: Some("t-second".into()),
                    ..TaskSpec::new(ToolName::ListAvailableGraphs)
                }
                .depends_on(vec!["t-first".into()]),
            ],
            "thread-1",
        );
        enqueue_goal(&s, &goal);

        // Tick 1: t-first runs through to review; t-second is deferred.
        s.tick();
        assert_eq!(s.queues.metrics(names::REVIEWS).depth, 1);

        // Tick 2: t-first is complete, so t-second is released and runs.
        s.tick();
        assert_eq!(s.queues.metrics(names::REVIEWS).depth, 2);
    }

    #[test]
    fn test_stop_prevents_new_ticks() {
        let s = scheduler();
        s.start(StartOptions::default());
        assert!(s.is_enabled());
        s.stop();
        assert!(!s.is_enabled());
    }

    #[test]
    fn test_status_reports_depths() {
        let s = scheduler();
        s.queues.enqueue(names::GOALS, json!({}), None);
        let status = s.status();
        assert_eq!(status.per_queue_depth["goalQueue"], 1);
        assert!(!status.enabled);
    }
}
