use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{Decision, ResumeDecision, SessionApi, StartOptions};
use crate::config::ClientConfig;
use crate::controller::{AlertKind, SessionAlert, SessionController};
use crate::errors::{SessionError, StreamFailure};
use crate::http::HttpSessionApi;
use crate::resume::{ResumeCoordinator, ResumeOutcome, ReviewState, ReviewTransition};
use crate::snapshot::{StatusSnapshot, ThreadId};
use crate::start::StartCoordinator;
use crate::store::ResumeResultStore;
use crate::stream::{ClosePolicy, CloseReason, ConnectionId, StreamManager, StreamSignal, StreamUpdate};
use crate::view::SessionView;

/// Work finished off the event loop, waiting to be applied.
#[derive(Debug)]
pub(crate) enum ClientEvent {
    Stream(StreamSignal),
    Resume(ResumeOutcome),
}

/// What changed after one event was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientUpdate {
    /// The controller now holds a new snapshot.
    Snapshot {
        connection: ConnectionId,
        /// Set when the snapshot closed the connection.
        closed: Option<CloseReason>,
    },
    /// A stream payload could not be decoded. The connection stays open.
    ParseWarning { detail: String },
    /// The connection ended. `surfaced` is false for the expected disconnect
    /// after completion.
    ConnectionLost { failure: StreamFailure, surfaced: bool },
    /// A review decision was reconciled or rolled back.
    Review(ReviewTransition),
}

/// Client for one drafting session at a time.
///
/// Owns the stream manager, the session controller and both coordinators.
/// Everything is driven from a single task: stream signals and resume
/// completions queue up and are applied one at a time by
/// [`next_update`](Self::next_update); user actions are plain method calls.
pub struct SessionClient {
    controller: SessionController,
    streams: StreamManager,
    review: ResumeCoordinator,
    starter: StartCoordinator,
    events: mpsc::Receiver<ClientEvent>,
}

impl SessionClient {
    pub fn builder() -> SessionClientBuilder {
        SessionClientBuilder::default()
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        self.controller.snapshot()
    }

    pub fn view(&self) -> SessionView<'_> {
        self.controller.view()
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.streams.thread_id()
    }

    pub fn review(&self) -> &ResumeCoordinator {
        &self.review
    }

    pub fn review_state(&self) -> &ReviewState {
        self.review.state()
    }

    /// Slot holding the last successful resume response.
    pub fn result_store(&self) -> &ResumeResultStore {
        self.review.store()
    }

    /// Starts a new session, discarding the current one.
    pub async fn start(
        &mut self,
        prompt: &str,
        options: StartOptions,
    ) -> Result<StatusSnapshot, SessionError> {
        let result = self
            .starter
            .start(
                prompt,
                options,
                &mut self.controller,
                &mut self.streams,
                &mut self.review,
            )
            .await;
        self.review.observe(&self.controller.view());
        result
    }

    /// Waits for the next event and applies it.
    ///
    /// Signals from torn-down connections and outcomes of forgotten
    /// submissions are skipped. Cancel safe. Returns `None` only once the
    /// event queue is closed.
    pub async fn next_update(&mut self) -> Option<ClientUpdate> {
        loop {
            let event = self.events.recv().await?;
            if let Some(update) = self.apply(event) {
                return Some(update);
            }
        }
    }

    /// Applies every event already queued, without waiting.
    pub fn drain_updates(&mut self) -> Vec<ClientUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            updates.extend(self.apply(event));
        }
        updates
    }

    pub fn select_decision(&mut self, decision: Decision) -> Result<(), SessionError> {
        Ok(self.review.select(decision, &self.controller)?)
    }

    pub fn cancel_decision(&mut self) -> bool {
        self.review.cancel()
    }

    pub fn edit_review_content(&mut self, content: impl Into<String>) -> Result<(), SessionError> {
        Ok(self.review.edit(content)?)
    }

    /// Confirms the selected decision and submits it.
    pub fn confirm_decision(&mut self) -> Result<ResumeDecision, SessionError> {
        let decision = self.review.confirm(&mut self.controller)?;
        self.review.observe(&self.controller.view());
        Ok(decision)
    }

    /// Reopens the stream of the active thread.
    pub fn restart_stream(&mut self) -> Result<Option<ConnectionId>, SessionError> {
        match self.streams.restart() {
            Ok(connection) => {
                if connection.is_some() {
                    self.controller.begin_connecting();
                }
                Ok(connection)
            }
            Err(err) => {
                self.controller
                    .report(SessionAlert::new(AlertKind::Connection, err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Closes the current connection, keeping the thread.
    pub fn close_stream(&mut self) -> bool {
        match self.streams.current().cloned() {
            Some(connection) => self.streams.close(&connection),
            None => false,
        }
    }

    fn apply(&mut self, event: ClientEvent) -> Option<ClientUpdate> {
        let update = match event {
            ClientEvent::Stream(signal) => {
                let accepted = self.streams.accept(signal)?;
                self.controller.apply(accepted.update.clone());
                match accepted.update {
                    StreamUpdate::Snapshot(_) => ClientUpdate::Snapshot {
                        connection: accepted.connection,
                        closed: accepted.closed,
                    },
                    StreamUpdate::Malformed { detail } => ClientUpdate::ParseWarning { detail },
                    StreamUpdate::ConnectionLost { failure, expected } => {
                        ClientUpdate::ConnectionLost {
                            failure,
                            surfaced: !expected,
                        }
                    }
                }
            }
            ClientEvent::Resume(outcome) => {
                let transition =
                    self.review
                        .reconcile(outcome, &mut self.controller, &mut self.streams)?;
                ClientUpdate::Review(transition)
            }
        };
        self.review.observe(&self.controller.view());
        debug!(?update, "client update");
        Some(update)
    }
}

/// Builder for [`SessionClient`].
#[derive(Default)]
pub struct SessionClientBuilder {
    api: Option<Arc<dyn SessionApi>>,
    config: Option<ClientConfig>,
    store: Option<ResumeResultStore>,
}

impl SessionClientBuilder {
    /// Uses a custom backend instead of the HTTP one.
    pub fn api(mut self, api: Arc<dyn SessionApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shares an existing result slot with other readers.
    pub fn result_store(mut self, store: ResumeResultStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates the config and builds the client.
    pub fn build(self) -> Result<SessionClient, SessionError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let api: Arc<dyn SessionApi> = match self.api {
            Some(api) => api,
            None => Arc::new(HttpSessionApi::new(config.clone())?),
        };
        let (tx, rx) = mpsc::channel(config.event_buffer_capacity);
        let streams = StreamManager::new(
            api.clone(),
            tx.clone(),
            ClosePolicy::new(&config.stages),
            config.max_stream_restarts,
        );
        let review = ResumeCoordinator::new(
            api.clone(),
            tx,
            self.store.unwrap_or_default(),
            config.stages.clone(),
        );
        Ok(SessionClient {
            controller: SessionController::new(config.stages),
            streams,
            review,
            starter: StartCoordinator::new(api),
            events: rx,
        })
    }
}
