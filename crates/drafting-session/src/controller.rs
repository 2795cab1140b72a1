use tracing::debug;

use crate::errors::StreamFailure;
use crate::snapshot::{StageNames, StatusSnapshot};
use crate::stream::StreamUpdate;
use crate::view::SessionView;

pub(crate) const CONNECT_FAILED: &str = "Cannot establish connection to the streaming server.";
pub(crate) const CONNECTION_LOST: &str = "Connection to the session stream was lost.";
pub(crate) const MALFORMED_PAYLOAD: &str = "Received malformed data from the server stream.";

/// Category of an alert held by the controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlertKind {
    /// The push stream failed to open or dropped.
    Connection,
    /// A stream payload could not be decoded.
    Parse,
    /// A start or resume call failed.
    Request,
}

/// Non-fatal error surfaced to the user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionAlert {
    pub kind: AlertKind,
    pub message: String,
}

impl SessionAlert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Canonical session state for the active thread.
///
/// Stream snapshots and optimistic overwrites both replace the held snapshot
/// outright; whichever arrived last wins.
#[derive(Debug, Default)]
pub struct SessionController {
    snapshot: Option<StatusSnapshot>,
    loading: bool,
    alert: Option<SessionAlert>,
    stages: StageNames,
}

impl SessionController {
    pub fn new(stages: StageNames) -> Self {
        Self {
            stages,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        self.snapshot.as_ref()
    }

    /// True between a stream open request and its first signal.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn alert(&self) -> Option<&SessionAlert> {
        self.alert.as_ref()
    }

    /// Message of the last alert.
    pub fn error(&self) -> Option<&str> {
        self.alert.as_ref().map(|a| a.message.as_str())
    }

    pub fn stages(&self) -> &StageNames {
        &self.stages
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView::classify(self.snapshot.as_ref(), &self.stages)
    }

    /// Overwrites the held snapshot. Used for optimistic transitions.
    pub fn set_snapshot(&mut self, snapshot: Option<StatusSnapshot>) {
        self.snapshot = snapshot;
    }

    /// A stream open was requested.
    pub fn begin_connecting(&mut self) {
        self.alert = None;
        self.loading = true;
    }

    /// Drops all session state.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.loading = false;
        self.alert = None;
    }

    pub fn report(&mut self, alert: SessionAlert) {
        self.alert = Some(alert);
    }

    /// Applies one update from the current connection.
    pub fn apply(&mut self, update: StreamUpdate) {
        self.loading = false;
        match update {
            StreamUpdate::Snapshot(snapshot) => {
                debug!(thread_id = %snapshot.thread_id, status = %snapshot.status, "snapshot applied");
                self.snapshot = Some(snapshot);
            }
            StreamUpdate::Malformed { .. } => {
                self.alert = Some(SessionAlert::new(AlertKind::Parse, MALFORMED_PAYLOAD));
            }
            StreamUpdate::ConnectionLost { failure, expected } => {
                if expected {
                    return;
                }
                let message = match failure {
                    StreamFailure::Connect(_) => CONNECT_FAILED,
                    StreamFailure::Dropped(_) => CONNECTION_LOST,
                };
                self.alert = Some(SessionAlert::new(AlertKind::Connection, message));
            }
        }
    }
}
