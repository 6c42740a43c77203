//! Typed events for the UI layer.
//!
//! The engine never talks to a UI directly; it emits events through an
//! [`EventSink`] and whoever owns the engine decides where they go — a
//! channel for a windowed shell, a no-op sink for the CLI.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// One event on the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A debounced, stable session-file save was detected.
    AlsSaved {
        project: String,
        path: String,
        at: DateTime<Utc>,
    },
    /// A project's diff against its cache was computed.
    ProjectDiff {
        project: String,
        added: Vec<String>,
        modified: Vec<String>,
        deleted: Vec<String>,
    },
    /// A push completed (finalize succeeded, cache rewritten).
    PushDone { project: String },
    /// Free-form log line for the UI console.
    Log(String),
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AlsSaved { .. } => "alsSaved",
            Self::ProjectDiff { .. } => "project:diff",
            Self::PushDone { .. } => "pushDone",
            Self::Log(_) => "log",
        }
    }

    /// Wire payload of the event.
    pub fn payload(&self) -> Value {
        match self {
            Self::AlsSaved { project, path, at } => json!({
                "project": project,
                "path": path,
                "at": at.to_rfc3339(),
            }),
            Self::ProjectDiff {
                project,
                added,
                modified,
                deleted,
            } => json!({
                "projectId": project,
                "added": added,
                "modified": modified,
                "deleted": deleted,
            }),
            Self::PushDone { project } => json!({ "project": project }),
            Self::Log(line) => Value::String(line.clone()),
        }
    }
}

/// Receives engine events. Emission is synchronous and must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Channel-backed bus: events fan into an unbounded receiver owned by the
/// UI adapter.
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelBus {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelBus {
    fn emit(&self, event: Event) {
        // A hung or departed receiver must never stall the engine.
        let _ = self.tx.send(event);
    }
}
