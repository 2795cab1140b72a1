use std::fmt;

use crate::snapshot::ThreadId;

/// Outbound request that produced a [`RequestError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RequestOperation {
    /// `POST /start_session`.
    Start,
    /// `POST /resume_session`.
    Resume,
}

impl RequestOperation {
    /// Message used when the server rejected the call without a `detail` field.
    pub fn generic_failure(self) -> &'static str {
        match self {
            Self::Start => "Failed to start session.",
            Self::Resume => "Failed to resume session.",
        }
    }

    /// Message used when no response was received at all.
    pub fn network_failure(self) -> &'static str {
        match self {
            Self::Start => "Network error during session start.",
            Self::Resume => "Network error during session resume.",
        }
    }
}

impl fmt::Display for RequestOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Resume => "resume",
        })
    }
}

/// Failure of a start or resume call.
///
/// These are raised at the call site and handled by the coordinator that issued
/// the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Server answered with a non-success status.
    #[error("{message}")]
    Rejected {
        operation: RequestOperation,
        status: u16,
        message: String,
    },
    /// No response was received.
    #[error("{message}")]
    Network {
        operation: RequestOperation,
        message: String,
    },
    /// Response arrived but could not be decoded as a status snapshot.
    #[error("{message}")]
    Protocol {
        operation: RequestOperation,
        message: String,
    },
}

impl RequestError {
    /// Creates a rejection, preferring the server-provided detail when present.
    pub fn rejected(operation: RequestOperation, status: u16, detail: Option<String>) -> Self {
        let message = detail
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| operation.generic_failure().to_string());
        Self::Rejected {
            operation,
            status,
            message,
        }
    }

    /// Creates a network failure carrying the generic per-operation message.
    pub fn network(operation: RequestOperation) -> Self {
        Self::Network {
            operation,
            message: operation.network_failure().to_string(),
        }
    }

    /// Creates a decoding failure.
    pub fn protocol(operation: RequestOperation, message: impl Into<String>) -> Self {
        Self::Protocol {
            operation,
            message: message.into(),
        }
    }

    /// Returns which call failed.
    pub fn operation(&self) -> RequestOperation {
        match self {
            Self::Rejected { operation, .. }
            | Self::Network { operation, .. }
            | Self::Protocol { operation, .. } => *operation,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. }
            | Self::Network { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Transport-level failure reported by a push stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamFailure {
    /// The connection could not be established.
    #[error("stream connect failed: {0}")]
    Connect(String),
    /// The connection dropped after it was established.
    #[error("stream dropped: {0}")]
    Dropped(String),
}

/// Errors returned by the stream manager's explicit operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The per-thread restart budget is spent.
    #[error("stream restart limit reached for thread {thread_id} ({limit} restarts)")]
    RestartLimit { thread_id: ThreadId, limit: u32 },
}

/// Misuse of the human review state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    /// There is no session snapshot to act on.
    #[error("no active session")]
    NoSession,
    /// The current snapshot is not halted at the review checkpoint.
    #[error("session is not awaiting review")]
    NotAwaitingReview,
    /// `confirm` was called without a selected decision.
    #[error("no decision selected")]
    NoDecisionSelected,
    /// A decision is already waiting for confirmation.
    #[error("a decision is already awaiting confirmation")]
    ConfirmationPending,
    /// A resume call is still in flight.
    #[error("a resume submission is already in flight")]
    SubmissionInFlight,
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// A start or resume call failed.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// An explicit stream operation failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// The review state machine rejected the action.
    #[error(transparent)]
    Review(#[from] ReviewError),
}
