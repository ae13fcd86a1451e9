//! Event and telemetry streaming handlers
//!
//! SSE endpoints tail the in-memory rings. Axum sets the three SSE headers;
//! the keep-alive comment goes out every 500 ms so intermediate proxies
//! don't cut idle streams.

use crate::state::AppState;
use crate::telemetry::TelemetryFilter;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_millis(500))
        .text("keep-alive")
}

/// GET /events/stream — typed events from the event log plus tail-mirrored
/// telemetry.
pub async fn events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut events_rx = state.events.subscribe();
    let mut telemetry_rx = state.telemetry.subscribe();

    enum Next {
        Emit(Event),
        Skip,
        Done,
    }

    let stream = async_stream::stream! {
        loop {
            let next = tokio::select! {
                entry = events_rx.recv() => match entry {
                    Ok(entry) => Event::default()
                        .event(entry.kind.as_str())
                        .json_data(&entry)
                        .map(Next::Emit)
                        .unwrap_or(Next::Skip),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event stream lagged");
                        Next::Skip
                    }
                    Err(RecvError::Closed) => Next::Done,
                },
                entry = telemetry_rx.recv() => match entry {
                    Ok(entry) => Event::default()
                        .event("TELEMETRY")
                        .json_data(&entry)
                        .map(Next::Emit)
                        .unwrap_or(Next::Skip),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "telemetry mirror lagged");
                        Next::Skip
                    }
                    Err(RecvError::Closed) => Next::Done,
                },
            };
            match next {
                Next::Emit(event) => yield Ok(event),
                Next::Skip => {}
                Next::Done => break,
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}

#[derive(Deserialize, Default)]
pub struct TelemetryQuery {
    cid: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    limit: Option<usize>,
    from: Option<u64>,
}

/// GET /telemetry — polled snapshot with optional cid/type filters.
pub async fn telemetry_get(
    State(state): State<AppState>,
    Query(query): Query<TelemetryQuery>,
) -> Json<Value> {
    let filter = TelemetryFilter {
        cid: query.cid,
        kind: query.kind,
        limit: query.limit,
    };
    let entries = state.telemetry.query(&filter);
    Json(json!({"ok": true, "count": entries.len(), "telemetry": entries}))
}

/// GET /telemetry/stream — SSE replay from `from`, then live tail.
pub async fn telemetry_stream(
    State(state): State<AppState>,
    Query(query): Query<TelemetryQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = TelemetryFilter {
        cid: query.cid,
        kind: query.kind,
        limit: None,
    };
    // Subscribe before snapshotting so nothing falls in the gap; the live
    // loop drops anything the replay already delivered.
    let mut rx = state.telemetry.subscribe();
    let replayed = state.telemetry.replay_from(query.from.unwrap_or(0));
    let last_replayed = replayed.last().map(|e| e.seq);

    let stream = async_stream::stream! {
        for entry in replayed {
            if filter.matches(&entry) {
                if let Ok(event) = Event::default().event("telemetry").json_data(&entry) {
                    yield Ok(event);
                }
            }
        }
        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if last_replayed.map(|seq| entry.seq <= seq).unwrap_or(false) {
                        continue;
                    }
                    if filter.matches(&entry) {
                        if let Ok(event) = Event::default().event("telemetry").json_data(&entry) {
                            yield Ok(event);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "telemetry stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(keep_alive())
}
