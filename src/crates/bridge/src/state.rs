//! Shared application state
//!
//! The process-wide singletons: projected store, queues, outbox, event log,
//! telemetry ring, chat transcript, and the three loop owners (committer,
//! scheduler, drainer). Everything is reached through `Arc`s so handlers
//! and tests share one world.

use crate::chat::ChatLog;
use crate::committer::{AgentHooks, AppliedSet, Committer, HttpAgentHooks, NoopHooks};
use crate::config::BridgeConfig;
use crate::drainer::SafetyDrainer;
use crate::events::EventLog;
use crate::outbox::ActionOutbox;
use crate::queue::QueueManager;
use crate::router::IntentRouter;
use crate::scheduler::Scheduler;
use crate::store::StoreHandle;
use crate::telemetry::TelemetryRing;
use std::sync::Arc;

/// Shared state handed to every handler and background loop.
#[derive(Clone)]
pub struct AppState {
    pub config: BridgeConfig,
    pub store: Arc<StoreHandle>,
    pub queues: Arc<QueueManager>,
    pub outbox: Arc<ActionOutbox>,
    pub events: Arc<EventLog>,
    pub telemetry: Arc<TelemetryRing>,
    pub chat: Arc<ChatLog>,
    pub committer: Arc<Committer>,
    pub drainer: Arc<SafetyDrainer>,
    pub scheduler: Arc<Scheduler>,
    pub router: Arc<IntentRouter>,
}

impl AppState {
    /// Production state: the committer's continuations POST back to the
    /// loopback listener.
    pub fn new(config: BridgeConfig) -> Self {
        let base_url = format!("http://127.0.0.1:{}", config.port);
        Self::build(config, Arc::new(HttpAgentHooks::new(base_url)))
    }

    /// State with no outbound hooks, for tests.
    pub fn headless(config: BridgeConfig) -> Self {
        Self::build(config, Arc::new(NoopHooks))
    }

    fn build(config: BridgeConfig, hooks: Arc<dyn AgentHooks>) -> Self {
        let events = Arc::new(EventLog::new(config.event_log_cap));
        let telemetry = Arc::new(TelemetryRing::new(config.telemetry_cap));
        let store = Arc::new(StoreHandle::new());
        let queues = Arc::new(QueueManager::new(config.lease_ttl, config.max_attempts));
        let outbox = Arc::new(ActionOutbox::new(Arc::clone(&events), Arc::clone(&telemetry)));
        let chat = Arc::new(ChatLog::new(config.chat_cap));
        chat.rehydrate(&events);

        let applied = Arc::new(AppliedSet::new(config.idempotency_cap));
        let committer = Arc::new(
            Committer::new(
                Arc::clone(&queues),
                Arc::clone(&outbox),
                Arc::clone(&events),
                Arc::clone(&telemetry),
                Arc::clone(&chat),
                Arc::clone(&store),
                Arc::clone(&applied),
                config.committer_window,
                config.committer_max,
            )
            .with_hooks(hooks),
        );
        let drainer = Arc::new(SafetyDrainer::new(
            Arc::clone(&queues),
            Arc::clone(&outbox),
            Arc::clone(&events),
            applied,
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&queues),
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&telemetry),
            config.scheduler_cadence,
        ));
        let router = Arc::new(IntentRouter::new(
            Arc::clone(&store),
            Arc::clone(&queues),
            Arc::clone(&outbox),
            Arc::clone(&events),
            Arc::clone(&telemetry),
            Arc::clone(&chat),
            Arc::clone(&scheduler),
        ));

        Self {
            config,
            store,
            queues,
            outbox,
            events,
            telemetry,
            chat,
            committer,
            drainer,
            scheduler,
            router,
        }
    }

    /// Spawn every background loop: lease sweeper, committer, scheduler,
    /// drainer. All stop when `shutdown` flips to true.
    pub fn spawn_background(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.queues.spawn_sweeper(
                Arc::clone(&self.events),
                self.config.sweep_interval,
                shutdown.clone(),
            ),
            self.committer
                .spawn(self.config.committer_cadence, shutdown.clone()),
            self.scheduler.spawn(shutdown.clone()),
            Arc::clone(&self.drainer).spawn(self.config.drainer_interval, shutdown),
        ]
    }
}
