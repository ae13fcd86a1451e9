//! Bounded chat transcript
//!
//! The transcript itself is in-memory only; on startup it re-hydrates
//! best-effort from `CHAT` entries still in the event log.

use crate::events::{EventKind, EventLog};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    pub role: String,
    pub text: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

/// Bounded transcript ring.
pub struct ChatLog {
    lines: Mutex<VecDeque<ChatLine>>,
    cap: usize,
}

impl ChatLog {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            cap,
        }
    }

    pub fn append(&self, role: impl Into<String>, text: impl Into<String>, cid: Option<String>) -> ChatLine {
        let line = ChatLine {
            role: role.into(),
            text: text.into(),
            ts: graphmodel::now_ms(),
            cid,
        };
        let mut lines = self.lines.lock();
        lines.push_back(line.clone());
        while lines.len() > self.cap {
            lines.pop_front();
        }
        line
    }

    pub fn snapshot(&self) -> Vec<ChatLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Re-hydrate from `CHAT` entries in the event log, oldest first.
    pub fn rehydrate(&self, events: &EventLog) {
        let mut lines = self.lines.lock();
        for entry in events.tail(self.cap) {
            if entry.kind != EventKind::Chat {
                continue;
            }
            let role = entry.payload["role"].as_str().unwrap_or("assistant");
            let text = entry.payload["text"].as_str().unwrap_or_default();
            lines.push_back(ChatLine {
                role: role.to_string(),
                text: text.to_string(),
                ts: entry.ts,
                cid: entry.payload["cid"].as_str().map(String::from),
            });
        }
        while lines.len() > self.cap {
            lines.pop_front();
        }
    }
}

/// Append a chat line and mirror it to the event log and telemetry, the
/// one way chat enters the system.
pub fn post_chat(
    chat: &ChatLog,
    events: &EventLog,
    telemetry: &crate::telemetry::TelemetryRing,
    role: &str,
    text: &str,
    cid: Option<String>,
) -> ChatLine {
    let line = chat.append(role, text, cid.clone());
    events.append(
        EventKind::Chat,
        serde_json::json!({"role": role, "text": text, "cid": cid}),
    );
    telemetry.record(
        crate::telemetry::TelemetryKind::Chat,
        cid,
        serde_json::json!({"role": role, "text": text}),
    );
    line
}
