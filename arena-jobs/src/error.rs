//! Error types for the job client

use arena_core::domain::request::RequestKind;
use arena_core::domain::watch::WatchEvent;
use thiserror::Error;

use crate::BackendKind;

/// Result type alias for job client operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can occur when starting or watching workloads
#[derive(Debug, Error)]
pub enum JobError {
    /// The backend could not be reached when the client was created
    #[error("Can't connect to {backend} backend: {message}")]
    Connection {
        backend: BackendKind,
        message: String,
    },

    /// The backend rejected the workload or could not be reached at create time
    #[error("Failed to submit workload {name}: {message}")]
    Submission { name: String, message: String },

    /// The backend accepted the workload but its reply could not be read
    #[error("Workload {name} was submitted but the backend reply was unreadable: {message}")]
    Unconfirmed { name: String, message: String },

    /// The selected backend does not implement this request kind
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        backend: BackendKind,
        operation: RequestKind,
    },

    /// The workload was submitted but its event stream could not be opened
    #[error("Failed to watch workload {name}: {message}")]
    Subscription { name: String, message: String },

    /// The workload reached the failed phase
    #[error("Workload {name} failed")]
    WorkloadFailed {
        name: String,
        snapshot: Box<WatchEvent>,
    },

    /// The workload disappeared before reaching the desired state
    #[error("Workload {name} {} before reaching desired state", removal(.snapshot))]
    WorkloadDeleted {
        name: String,
        snapshot: Box<WatchEvent>,
    },

    /// The event stream reported an error or kept closing without events
    #[error("Watch on workload {name} errored before reaching desired state: {message}")]
    WatchStream {
        name: String,
        message: String,
        /// Last event observed before the stream broke, if any
        snapshot: Option<Box<WatchEvent>>,
    },

    /// The caller abandoned the watch
    #[error("Watch on workload {name} was cancelled")]
    Cancelled { name: String },
}

impl JobError {
    /// Create a submission error for the named workload
    pub fn submission(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Submission {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a subscription error for the named workload
    pub fn subscription(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscription {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the workload was accepted by the backend before this error
    ///
    /// `false` means nothing was started; `true` means the workload exists
    /// (or existed) and its outcome is unknown or failed.
    pub fn workload_started(&self) -> bool {
        matches!(
            self,
            Self::Unconfirmed { .. }
                | Self::Subscription { .. }
                | Self::WorkloadFailed { .. }
                | Self::WorkloadDeleted { .. }
                | Self::WatchStream { .. }
                | Self::Cancelled { .. }
        )
    }

    /// The last event observed by the watch that produced this error
    pub fn snapshot(&self) -> Option<&WatchEvent> {
        match self {
            Self::WorkloadFailed { snapshot, .. } | Self::WorkloadDeleted { snapshot, .. } => {
                Some(snapshot)
            }
            Self::WatchStream { snapshot, .. } => snapshot.as_deref(),
            _ => None,
        }
    }

    /// Exit code of the workload, if the watch saw it terminate
    pub fn exit_code(&self) -> Option<i32> {
        self.snapshot().and_then(|event| event.exit_code)
    }
}

fn removal(snapshot: &WatchEvent) -> String {
    match snapshot.exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "was deleted".to_string(),
    }
}
