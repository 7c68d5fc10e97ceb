//! Watch domain types
//!
//! Both backends translate their native status updates into [`WatchEvent`]s
//! so a single reduction loop can decide when a workload is done.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Kind of change the backend observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// Lifecycle stage of a workload as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// One observation of a workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub phase: Phase,
    /// Backend-native object the event was decoded from, kept for diagnostics
    pub snapshot: JsonValue,
    /// Exit code of the workload's main process, once it has terminated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl EventKind {
    /// Parses a watch event type; anything unrecognised is treated as an error event
    pub fn parse(s: &str) -> Self {
        match s {
            "ADDED" => EventKind::Added,
            "MODIFIED" => EventKind::Modified,
            "DELETED" => EventKind::Deleted,
            _ => EventKind::Error,
        }
    }
}

impl Phase {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Phase::Pending,
            "Running" => Phase::Running,
            "Succeeded" => Phase::Succeeded,
            "Failed" => Phase::Failed,
            _ => Phase::Unknown,
        }
    }
}

impl WatchEvent {
    pub fn new(kind: EventKind, phase: Phase, snapshot: JsonValue) -> Self {
        Self {
            kind,
            phase,
            snapshot,
            exit_code: None,
            observed_at: chrono::Utc::now(),
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Builds an error event for failures of the stream itself
    pub fn stream_error(message: impl Into<String>) -> Self {
        Self::new(
            EventKind::Error,
            Phase::Unknown,
            serde_json::json!({ "message": message.into() }),
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
            EventKind::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
