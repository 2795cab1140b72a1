use std::fmt;
use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::SessionApi;
use crate::client::ClientEvent;
use crate::errors::{StreamError, StreamFailure};
use crate::snapshot::{SessionStatus, StageNames, StatusSnapshot, ThreadId};

/// Identity of one push-stream connection: a thread and the epoch it was
/// opened under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub thread_id: ThreadId,
    pub epoch: u64,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.thread_id, self.epoch)
    }
}

/// Why a connection was torn down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// `complete` with a dead backend thread.
    Completed,
    /// `halted` with a dead thread outside the HIL stage.
    UnexpectedHalt,
    /// The transport failed or the server ended the body.
    ConnectionLost,
    /// Replaced by an explicit restart.
    Restarted,
    /// Replaced by a connection for another thread.
    ThreadChanged,
    /// The thread was dropped (a new session is starting).
    Detached,
    /// Closed by the caller.
    Explicit,
    /// The manager was dropped.
    Teardown,
}

/// Decides when a snapshot ends the connection.
#[derive(Clone, Debug)]
pub struct ClosePolicy {
    hil_stage: String,
}

impl ClosePolicy {
    pub fn new(stages: &StageNames) -> Self {
        Self {
            hil_stage: stages.hil.clone(),
        }
    }

    /// Returns the close reason for a snapshot, or `None` to stay open.
    pub fn evaluate(&self, snapshot: &StatusSnapshot) -> Option<CloseReason> {
        if snapshot.thread_alive {
            return None;
        }
        match snapshot.status {
            SessionStatus::Complete => Some(CloseReason::Completed),
            SessionStatus::Halted if !snapshot.is_active_node(&self.hil_stage) => {
                Some(CloseReason::UnexpectedHalt)
            }
            _ => None,
        }
    }
}

/// Raw signal from a connection task, not yet checked against the current
/// epoch.
#[derive(Debug)]
pub(crate) struct StreamSignal {
    pub connection: ConnectionId,
    pub kind: SignalKind,
}

#[derive(Debug)]
pub(crate) enum SignalKind {
    Snapshot(StatusSnapshot),
    Malformed(String),
    Lost(StreamFailure),
}

/// A signal from the current connection, after the close policy ran.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamUpdate {
    Snapshot(StatusSnapshot),
    /// The payload was not a valid snapshot. The connection stays open.
    Malformed { detail: String },
    /// The connection failed. `expected` is set when the last observed status
    /// was already `complete`.
    ConnectionLost {
        failure: StreamFailure,
        expected: bool,
    },
}

/// Outcome of accepting a signal from the current connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Accepted {
    pub connection: ConnectionId,
    pub update: StreamUpdate,
    /// Set when this signal closed the connection.
    pub closed: Option<CloseReason>,
}

#[derive(Clone)]
struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

struct StreamHandle {
    id: ConnectionId,
    abort: AbortHandle,
}

/// Owns the push-stream connection of the active thread.
///
/// At most one connection is live at a time. Every open takes a fresh epoch;
/// signals carrying any other epoch are dropped, so a torn-down connection can
/// never leak events into the session. Nothing here reconnects on its own.
pub struct StreamManager {
    api: Arc<dyn SessionApi>,
    events: mpsc::Sender<ClientEvent>,
    policy: ClosePolicy,
    max_restarts: u32,
    thread: Option<ThreadId>,
    current: Option<StreamHandle>,
    epoch: u64,
    restarts: u32,
    last_status: Option<SessionStatus>,
}

impl StreamManager {
    pub(crate) fn new(
        api: Arc<dyn SessionApi>,
        events: mpsc::Sender<ClientEvent>,
        policy: ClosePolicy,
        max_restarts: u32,
    ) -> Self {
        Self {
            api,
            events,
            policy,
            max_restarts,
            thread: None,
            current: None,
            epoch: 0,
            restarts: 0,
            last_status: None,
        }
    }

    /// Opens a connection for `thread_id`, tearing down whatever was open.
    ///
    /// Adoption only; reopening the active thread goes through
    /// [`restart`](Self::restart) so it counts against the limit.
    pub(crate) fn open(&mut self, thread_id: ThreadId) -> ConnectionId {
        let same_thread = self.thread.as_ref() == Some(&thread_id);
        if !same_thread {
            self.restarts = 0;
            self.last_status = None;
        }
        self.teardown(if same_thread {
            CloseReason::Restarted
        } else {
            CloseReason::ThreadChanged
        });
        self.thread = Some(thread_id.clone());
        self.connect(thread_id)
    }

    /// Closes `connection` if it is still the current one.
    pub fn close(&mut self, connection: &ConnectionId) -> bool {
        if self.current() != Some(connection) {
            return false;
        }
        self.teardown(CloseReason::Explicit);
        true
    }

    /// Replaces the current connection with a fresh one for the same thread.
    ///
    /// Returns `Ok(None)` when no thread is active.
    pub fn restart(&mut self) -> Result<Option<ConnectionId>, StreamError> {
        let Some(thread_id) = self.thread.clone() else {
            debug!("stream restart requested without an active thread");
            return Ok(None);
        };
        if self.restarts >= self.max_restarts {
            warn!(thread_id = %thread_id, limit = self.max_restarts, "stream restart limit reached");
            return Err(StreamError::RestartLimit {
                thread_id,
                limit: self.max_restarts,
            });
        }
        self.restarts += 1;
        info!(thread_id = %thread_id, restarts = self.restarts, "restarting session stream");
        self.teardown(CloseReason::Restarted);
        Ok(Some(self.connect(thread_id)))
    }

    /// Closes the connection and forgets the thread.
    pub fn detach(&mut self) {
        self.teardown(CloseReason::Detached);
        self.thread = None;
        self.restarts = 0;
        self.last_status = None;
    }

    pub fn current(&self) -> Option<&ConnectionId> {
        self.current.as_ref().map(|h| &h.id)
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Latest epoch handed out.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Restarts used for the active thread.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Checks a signal against the current connection and applies the close
    /// policy. Returns `None` for signals from any other connection.
    pub(crate) fn accept(&mut self, signal: StreamSignal) -> Option<Accepted> {
        if self.current() != Some(&signal.connection) {
            debug!(connection = %signal.connection, "dropping signal from stale connection");
            return None;
        }

        let connection = signal.connection;
        match signal.kind {
            SignalKind::Snapshot(snapshot) => {
                self.last_status = Some(snapshot.status);
                let closed = self.policy.evaluate(&snapshot);
                if let Some(reason) = &closed {
                    self.teardown(reason.clone());
                }
                Some(Accepted {
                    connection,
                    update: StreamUpdate::Snapshot(snapshot),
                    closed,
                })
            }
            SignalKind::Malformed(detail) => {
                warn!(connection = %connection, detail = %detail, "malformed stream payload");
                Some(Accepted {
                    connection,
                    update: StreamUpdate::Malformed { detail },
                    closed: None,
                })
            }
            SignalKind::Lost(failure) => {
                let expected = self.last_status == Some(SessionStatus::Complete);
                if expected {
                    debug!(connection = %connection, "stream ended after completion");
                } else {
                    warn!(connection = %connection, error = %failure, "session stream lost");
                }
                self.teardown(CloseReason::ConnectionLost);
                Some(Accepted {
                    connection,
                    update: StreamUpdate::ConnectionLost { failure, expected },
                    closed: Some(CloseReason::ConnectionLost),
                })
            }
        }
    }

    fn connect(&mut self, thread_id: ThreadId) -> ConnectionId {
        self.epoch += 1;
        let id = ConnectionId {
            thread_id,
            epoch: self.epoch,
        };
        let (abort_tx, abort_rx) = watch::channel(false);
        tokio::spawn(pump(
            self.api.clone(),
            id.clone(),
            self.events.clone(),
            abort_rx,
        ));
        info!(connection = %id, "session stream opened");
        self.current = Some(StreamHandle {
            id: id.clone(),
            abort: AbortHandle { tx: abort_tx },
        });
        id
    }

    fn teardown(&mut self, reason: CloseReason) {
        if let Some(handle) = self.current.take() {
            handle.abort.abort();
            info!(connection = %handle.id, reason = ?reason, "session stream closed");
        }
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.teardown(CloseReason::Teardown);
    }
}

async fn pump(
    api: Arc<dyn SessionApi>,
    connection: ConnectionId,
    events: mpsc::Sender<ClientEvent>,
    mut abort_rx: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = aborted(&mut abort_rx) => {
            debug!(connection = %connection, "stream task stopped");
        }
        _ = forward(api, connection.clone(), events) => {}
    }
}

async fn aborted(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        // A dropped handle counts as an abort.
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn forward(
    api: Arc<dyn SessionApi>,
    connection: ConnectionId,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut payloads = match api.open_stream(&connection.thread_id).await {
        Ok(payloads) => payloads,
        Err(failure) => {
            let _ = send(&events, &connection, SignalKind::Lost(failure)).await;
            return;
        }
    };

    while let Some(item) = payloads.next().await {
        let kind = match item {
            Ok(payload) => match StatusSnapshot::decode(&payload) {
                Ok(snapshot) => SignalKind::Snapshot(snapshot),
                Err(e) => SignalKind::Malformed(e.to_string()),
            },
            Err(failure) => {
                let _ = send(&events, &connection, SignalKind::Lost(failure)).await;
                return;
            }
        };
        if !send(&events, &connection, kind).await {
            return;
        }
    }

    let _ = send(
        &events,
        &connection,
        SignalKind::Lost(StreamFailure::Dropped("stream closed by server".into())),
    )
    .await;
}

/// Returns false once the client is gone.
async fn send(events: &mpsc::Sender<ClientEvent>, connection: &ConnectionId, kind: SignalKind) -> bool {
    events
        .send(ClientEvent::Stream(StreamSignal {
            connection: connection.clone(),
            kind,
        }))
        .await
        .is_ok()
}
