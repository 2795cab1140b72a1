use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedSender, unbounded};
use tokio::sync::{Notify, mpsc};

use crate::api::{PayloadStream, ResumeDecision, SessionApi, StartRequest};
use crate::client::ClientEvent;
use crate::errors::{RequestError, RequestOperation, StreamFailure};
use crate::snapshot::{SessionStatus, StatusSnapshot, ThreadId};

const WAIT: Duration = Duration::from_secs(2);

/// Test handle feeding payloads into one fake connection.
#[derive(Clone)]
pub(crate) struct Feed {
    tx: UnboundedSender<Result<String, StreamFailure>>,
}

impl Feed {
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_raw(&value.to_string());
    }

    pub fn send_raw(&self, payload: &str) {
        let _ = self.tx.unbounded_send(Ok(payload.to_string()));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .tx
            .unbounded_send(Err(StreamFailure::Dropped(message.to_string())));
    }

    /// Ends the stream as if the server closed the body.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    /// Whether the client side of this connection has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Default)]
struct FakeState {
    feeds: Vec<(ThreadId, Feed)>,
    refusals: VecDeque<StreamFailure>,
    start_results: VecDeque<Result<StatusSnapshot, RequestError>>,
    resume_results: VecDeque<Result<StatusSnapshot, RequestError>>,
    start_calls: Vec<StartRequest>,
    resume_calls: Vec<ResumeDecision>,
    resume_gate: Option<Arc<Notify>>,
}

/// Scripted `SessionApi`.
///
/// Every `open_stream` call creates a new connection whose payloads the test
/// pushes through a [`Feed`]. Start and resume results are served in the
/// order they were queued.
#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake api lock")
    }

    pub fn push_start(&self, result: Result<StatusSnapshot, RequestError>) {
        self.lock().start_results.push_back(result);
    }

    pub fn push_resume(&self, result: Result<StatusSnapshot, RequestError>) {
        self.lock().resume_results.push_back(result);
    }

    pub fn refuse_next_open(&self, failure: StreamFailure) {
        self.lock().refusals.push_back(failure);
    }

    /// Holds every later resume call until the returned gate is notified.
    pub fn pause_resumes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().resume_gate = Some(gate.clone());
        gate
    }

    pub fn open_count(&self) -> usize {
        self.lock().feeds.len()
    }

    pub fn opened_threads(&self) -> Vec<ThreadId> {
        self.lock().feeds.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn start_calls(&self) -> Vec<StartRequest> {
        self.lock().start_calls.clone()
    }

    pub fn resume_calls(&self) -> Vec<ResumeDecision> {
        self.lock().resume_calls.clone()
    }

    /// Waits until connection `index` has been opened and returns its feed.
    pub async fn feed(&self, index: usize) -> Feed {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some((_, feed)) = self.lock().feeds.get(index) {
                return feed.clone();
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("connection {index} was never opened");
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[async_trait::async_trait]
impl SessionApi for FakeApi {
    async fn start_session(&self, request: StartRequest) -> Result<StatusSnapshot, RequestError> {
        let mut state = self.lock();
        state.start_calls.push(request);
        state
            .start_results
            .pop_front()
            .unwrap_or_else(|| Err(RequestError::network(RequestOperation::Start)))
    }

    async fn resume_session(
        &self,
        decision: ResumeDecision,
    ) -> Result<StatusSnapshot, RequestError> {
        let (result, gate) = {
            let mut state = self.lock();
            let fallback =
                StatusSnapshot::new(decision.thread_id.clone(), SessionStatus::Running);
            state.resume_calls.push(decision);
            let result = state.resume_results.pop_front().unwrap_or(Ok(fallback));
            (result, state.resume_gate.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn open_stream(&self, thread_id: &ThreadId) -> Result<PayloadStream, StreamFailure> {
        let mut state = self.lock();
        if let Some(failure) = state.refusals.pop_front() {
            return Err(failure);
        }
        let (tx, rx) = unbounded();
        state.feeds.push((thread_id.clone(), Feed { tx }));
        Ok(Box::pin(rx))
    }
}

/// Receives the next client event or fails the test.
pub(crate) async fn recv_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// Polls `done` until it holds or fails the test.
pub(crate) async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !done() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub(crate) fn snapshot(value: serde_json::Value) -> StatusSnapshot {
    serde_json::from_value(value).expect("snapshot fixture")
}
