//! End-to-end pipeline flow: goal → task → patch → review → committer →
//! pending action, driven tick by tick without timers.

use bridge::config::BridgeConfig;
use bridge::events::EventKind;
use bridge::queue::names;
use bridge::scheduler::StartOptions;
use bridge::state::AppState;
use graphmodel::{ActionKind, Goal, GoalKind, TaskSpec, ToolName};
use serde_json::json;
use std::time::Duration;

fn test_state() -> AppState {
    let mut config = BridgeConfig::default();
    config.committer_window = Duration::from_millis(10);
    AppState::headless(config)
}

fn enqueue_goal(state: &AppState, goal: &Goal) {
    state.queues.enqueue(
        names::GOALS,
        serde_json::to_value(goal).unwrap(),
        Some(goal.thread_id.clone()),
    );
    state.events.append(
        EventKind::GoalEnqueued,
        json!({"goalId": goal.id, "goal": goal.goal}),
    );
}

#[tokio::test]
async fn create_graph_reaches_the_ui_with_open_graph_trailer() {
    let state = test_state();
    state.scheduler.start(StartOptions::default());

    let goal = Goal::new(
        GoalKind::CreateGraph,
        vec![TaskSpec::new(ToolName::CreateGraph)
            .with_args(json!({"name": "Breaking Bad"}))],
        "thread-1",
    );
    enqueue_goal(&state, &goal);

    state.scheduler.tick(); // goal -> task -> patch -> review
    state.committer.tick().await; // review -> pending actions

    let actions = state.outbox.snapshot();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].action, ActionKind::ApplyMutations);
    let ops = actions[0].params[0].as_array().unwrap();
    assert_eq!(ops[0]["type"], "createNewGraph");
    assert_eq!(ops[0]["initialData"]["name"], "Breaking Bad");
    assert_eq!(actions[1].action, ActionKind::OpenGraph);
    assert_eq!(
        actions[1].params[0],
        ops[0]["initialData"]["id"],
        "openGraph targets the created graph"
    );

    let kinds: Vec<EventKind> = state.events.tail(50).into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::GoalEnqueued));
    assert!(kinds.contains(&EventKind::TaskEnqueued));
    assert!(kinds.contains(&EventKind::PatchSubmitted));
    assert!(kinds.contains(&EventKind::ReviewEnqueued));
    assert!(kinds.contains(&EventKind::PatchApplied));

    let applied = state
        .events
        .tail(50)
        .into_iter()
        .find(|e| e.kind == EventKind::PatchApplied)
        .unwrap();
    assert_eq!(applied.payload["opsCount"], 1);
}

#[tokio::test]
async fn replaying_goals_mints_distinct_patch_ids() {
    let state = test_state();
    state.scheduler.start(StartOptions::default());

    for _ in 0..2 {
        let goal = Goal::new(
            GoalKind::CreateGraph,
            vec![TaskSpec::new(ToolName::CreateGraph).with_args(json!({"name": "Twice"}))],
            "thread-1",
        );
        enqueue_goal(&state, &goal);
        state.scheduler.tick();
        state.committer.tick().await;
    }

    // Two distinct goals, two distinct patch ids, two applies.
    let applied = state
        .events
        .tail(100)
        .into_iter()
        .filter(|e| e.kind == EventKind::PatchApplied)
        .count();
    assert_eq!(applied, 2);
}

#[tokio::test]
async fn drainer_covers_a_paused_committer_without_double_apply() {
    let state = test_state();
    state.committer.set_enabled(false);

    // An approved review lands while the committer is paused.
    let patch = graphmodel::Patch::new(
        "graph-9",
        vec![graphmodel::Op::AddNodeInstance {
            graph_id: "graph-9".into(),
            prototype_id: "p1".into(),
            position: graphmodel::Position::new(320.0, 100.0),
            instance_id: "i1".into(),
        }],
    );
    let patch_id = patch.patch_id.clone();
    let review = graphmodel::Review::approved(patch.clone());
    state.queues.enqueue(
        names::REVIEWS,
        serde_json::to_value(&review).unwrap(),
        Some("graph-9".into()),
    );

    state.drainer.tick();
    let first_pass = state.outbox.snapshot().len();
    assert!(first_pass >= 1, "drainer emitted the stalled patch");

    // Committer resumes; the same patch id arrives again.
    state.committer.set_enabled(true);
    state.queues.enqueue(
        names::REVIEWS,
        serde_json::to_value(&graphmodel::Review::approved(patch)).unwrap(),
        Some("graph-9".into()),
    );
    state.committer.tick().await;

    let mutation_bundles = state
        .outbox
        .snapshot()
        .into_iter()
        .filter(|a| a.action == ActionKind::ApplyMutations)
        .count();
    assert_eq!(
        mutation_bundles, 1,
        "patch {} must not apply twice across committer and drainer",
        patch_id
    );
}

#[tokio::test]
async fn read_only_analysis_emits_no_mutations() {
    let state = test_state();
    state.scheduler.start(StartOptions::default());
    state.store.replace(graphmodel::ProjectedStore {
        graphs: vec![graphmodel::GraphSnapshot {
            id: "g1".into(),
            name: "Kitchen".into(),
            ..Default::default()
        }],
        active_graph_id: Some("g1".into()),
        ..Default::default()
    });

    let goal = Goal::new(
        GoalKind::AnalyzeGraph,
        vec![
            TaskSpec::new(ToolName::VerifyState),
            TaskSpec::new(ToolName::ReadGraphStructure).with_args(json!({"graphId": "g1"})),
        ],
        "thread-1",
    );
    enqueue_goal(&state, &goal);

    state.scheduler.tick();
    state.committer.tick().await;

    assert!(
        state.outbox.snapshot().is_empty(),
        "reads never produce pending actions"
    );
    let chat = state.chat.snapshot();
    assert!(!chat.is_empty(), "read summaries reach chat");
}

#[tokio::test]
async fn liveness_reviews_resolve_within_ten_cadences() {
    let state = test_state();
    state.scheduler.start(StartOptions::default());

    let goal = Goal::new(
        GoalKind::CreateGraph,
        vec![TaskSpec::new(ToolName::CreateGraph).with_args(json!({"name": "Alive"}))],
        "thread-1",
    );
    enqueue_goal(&state, &goal);

    let mut resolved = false;
    for _ in 0..10 {
        state.scheduler.tick();
        state.committer.tick().await;
        let done = state.events.tail(50).into_iter().any(|e| {
            e.kind == EventKind::PatchApplied || e.kind == EventKind::PatchRejected
        });
        if done {
            resolved = true;
            break;
        }
    }
    assert!(resolved, "approved work must apply or reject within ten ticks");
}
