use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{Decision, ResumeDecision, SessionApi};
use crate::client::ClientEvent;
use crate::controller::{AlertKind, SessionAlert, SessionController};
use crate::errors::{RequestError, ReviewError};
use crate::snapshot::{SessionStatus, StageNames, StatusSnapshot};
use crate::store::ResumeResultStore;
use crate::stream::{ConnectionId, StreamManager};
use crate::view::SessionView;

/// Where the human review interaction stands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewState {
    Idle,
    /// A decision was picked and awaits confirmation. No request yet.
    Confirming { decision: Decision },
    /// The resume call is in flight. Decision controls are disabled.
    Submitting { decision: Decision, decision_id: Uuid },
    /// The server accepted the decision.
    Reconciled { decision: Decision },
    /// The resume call failed and the optimistic update was reverted.
    RolledBack { decision: Decision, message: String },
}

/// Completion of a resume call, delivered through the client event queue.
#[derive(Debug)]
pub(crate) struct ResumeOutcome {
    pub decision_id: Uuid,
    pub result: Result<StatusSnapshot, RequestError>,
}

/// Result of reconciling a resume call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReviewTransition {
    Reconciled {
        decision: Decision,
        /// New connection opened for a rejection.
        restarted: Option<ConnectionId>,
    },
    RolledBack {
        decision: Decision,
        message: String,
    },
}

struct PendingSubmission {
    decision_id: Uuid,
    decision: Decision,
    hint: String,
    previous_stage: Option<String>,
}

/// Drives approve/reject decisions at the review checkpoint.
///
/// Confirming a decision writes an optimistic snapshot through the
/// controller, then submits it. Only one submission may be in flight. Success
/// publishes the response to the shared store (and restarts the stream for a
/// rejection); failure reverts the session to halted.
pub struct ResumeCoordinator {
    api: Arc<dyn SessionApi>,
    events: mpsc::Sender<ClientEvent>,
    store: ResumeResultStore,
    stages: StageNames,
    state: ReviewState,
    content: String,
    /// Draft the current content was seeded from.
    seeded_from: Option<String>,
    pending: Option<PendingSubmission>,
    in_review: bool,
}

impl ResumeCoordinator {
    pub(crate) fn new(
        api: Arc<dyn SessionApi>,
        events: mpsc::Sender<ClientEvent>,
        store: ResumeResultStore,
        stages: StageNames,
    ) -> Self {
        Self {
            api,
            events,
            store,
            stages,
            state: ReviewState::Idle,
            content: String::new(),
            seeded_from: None,
            pending: None,
            in_review: false,
        }
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    /// Text that will be sent with the decision.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, ReviewState::Submitting { .. })
    }

    /// Whether approve/reject may be picked right now.
    pub fn controls_enabled(&self) -> bool {
        !self.is_submitting()
    }

    /// Failure message of the last rolled-back submission.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            ReviewState::RolledBack { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn store(&self) -> &ResumeResultStore {
        &self.store
    }

    /// Tracks the review checkpoint appearing and disappearing.
    ///
    /// A fresh checkpoint seeds the editable content from the draft, and a new
    /// draft at the same checkpoint replaces content the human has not edited.
    /// After a rollback the human's edits are kept so they can retry.
    pub(crate) fn observe(&mut self, view: &SessionView<'_>) {
        match (view, self.in_review) {
            (SessionView::AwaitingReview { draft }, false) => {
                self.in_review = true;
                if matches!(
                    self.state,
                    ReviewState::Idle | ReviewState::Reconciled { .. }
                ) {
                    self.seed(draft);
                    self.state = ReviewState::Idle;
                }
            }
            (SessionView::AwaitingReview { draft }, true) => {
                let unedited = self.seeded_from.as_deref() == Some(self.content.as_str());
                if !self.is_submitting()
                    && unedited
                    && self.seeded_from.as_deref() != Some(*draft)
                {
                    self.seed(draft);
                }
            }
            (_, true) => {
                self.in_review = false;
                if matches!(self.state, ReviewState::Confirming { .. }) {
                    self.state = ReviewState::Idle;
                }
            }
            (_, false) => {}
        }
    }

    fn seed(&mut self, draft: &str) {
        self.content = draft.to_string();
        self.seeded_from = Some(draft.to_string());
    }

    /// Replaces the text sent with the decision.
    pub fn edit(&mut self, content: impl Into<String>) -> Result<(), ReviewError> {
        if self.is_submitting() {
            return Err(ReviewError::SubmissionInFlight);
        }
        self.content = content.into();
        Ok(())
    }

    /// Picks a decision. Nothing is sent until [`confirm`](Self::confirm).
    pub fn select(
        &mut self,
        decision: Decision,
        controller: &SessionController,
    ) -> Result<(), ReviewError> {
        match self.state {
            ReviewState::Submitting { .. } => return Err(ReviewError::SubmissionInFlight),
            ReviewState::Confirming { .. } => return Err(ReviewError::ConfirmationPending),
            _ => {}
        }
        if controller.snapshot().is_none() {
            return Err(ReviewError::NoSession);
        }
        if !controller.view().awaits_review() {
            return Err(ReviewError::NotAwaitingReview);
        }
        self.state = ReviewState::Confirming { decision };
        Ok(())
    }

    /// Backs out of a pending confirmation.
    pub fn cancel(&mut self) -> bool {
        if matches!(self.state, ReviewState::Confirming { .. }) {
            self.state = ReviewState::Idle;
            return true;
        }
        false
    }

    /// Confirms the selected decision: applies the optimistic update and
    /// submits the resume call.
    pub fn confirm(
        &mut self,
        controller: &mut SessionController,
    ) -> Result<ResumeDecision, ReviewError> {
        let decision = match self.state {
            ReviewState::Confirming { decision } => decision,
            ReviewState::Submitting { .. } => return Err(ReviewError::SubmissionInFlight),
            _ => return Err(ReviewError::NoDecisionSelected),
        };
        let current = controller.snapshot().ok_or(ReviewError::NoSession)?;

        let request = ResumeDecision {
            thread_id: current.thread_id.clone(),
            suggested_content: self.content.clone(),
            human_decision: decision,
        };
        let (status, hint) = match decision {
            Decision::Approve => (SessionStatus::Running, self.stages.finalize.clone()),
            Decision::Reject => (SessionStatus::Revising, self.stages.drafting.clone()),
        };
        let previous_stage = current.active_node.clone();
        let mut optimistic = current.clone();
        optimistic.status = status;
        optimistic.active_node = Some(hint.clone());
        optimistic.thread_alive = true;
        controller.set_snapshot(Some(optimistic));

        let decision_id = Uuid::new_v4();
        info!(%decision_id, thread_id = %request.thread_id, %decision, "submitting review decision");
        self.pending = Some(PendingSubmission {
            decision_id,
            decision,
            hint,
            previous_stage,
        });
        self.state = ReviewState::Submitting {
            decision,
            decision_id,
        };

        let api = self.api.clone();
        let events = self.events.clone();
        let body = request.clone();
        tokio::spawn(async move {
            let result = api.resume_session(body).await;
            // The client may be gone by now; then there is nothing to reconcile.
            let _ = events
                .send(ClientEvent::Resume(ResumeOutcome {
                    decision_id,
                    result,
                }))
                .await;
        });

        Ok(request)
    }

    /// Applies a finished resume call. Outcomes of submissions this
    /// coordinator no longer tracks are ignored.
    pub(crate) fn reconcile(
        &mut self,
        outcome: ResumeOutcome,
        controller: &mut SessionController,
        streams: &mut StreamManager,
    ) -> Option<ReviewTransition> {
        let pending = match self.pending.take() {
            Some(p) if p.decision_id == outcome.decision_id => p,
            other => {
                self.pending = other;
                debug!(decision_id = %outcome.decision_id, "ignoring stale resume outcome");
                return None;
            }
        };
        let decision = pending.decision;

        match outcome.result {
            Ok(response) => {
                info!(decision_id = %pending.decision_id, %decision, "review decision accepted");
                self.store.publish(response);
                self.state = ReviewState::Reconciled { decision };
                let restarted = match decision {
                    Decision::Approve => None,
                    Decision::Reject => match streams.restart() {
                        Ok(connection) => {
                            if connection.is_some() {
                                controller.begin_connecting();
                            }
                            connection
                        }
                        Err(e) => {
                            controller.report(SessionAlert::new(AlertKind::Connection, e.to_string()));
                            None
                        }
                    },
                };
                Some(ReviewTransition::Reconciled {
                    decision,
                    restarted,
                })
            }
            Err(err) => {
                warn!(decision_id = %pending.decision_id, %decision, error = %err, "review decision failed");
                let message = format!("Failed to resume session: {}", err.message());
                if let Some(current) = controller.snapshot() {
                    let mut reverted = current.clone();
                    reverted.status = SessionStatus::Halted;
                    reverted.thread_alive = false;
                    if reverted.active_node.as_deref() == Some(pending.hint.as_str()) {
                        reverted.active_node = pending.previous_stage;
                    }
                    controller.set_snapshot(Some(reverted));
                }
                self.state = ReviewState::RolledBack {
                    decision,
                    message: message.clone(),
                };
                Some(ReviewTransition::RolledBack { decision, message })
            }
        }
    }

    /// Forgets any review in progress. A submission still in flight will be
    /// ignored when it completes.
    pub(crate) fn reset(&mut self) {
        self.state = ReviewState::Idle;
        self.content.clear();
        self.seeded_from = None;
        self.pending = None;
        self.in_review = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RequestOperation;
    use crate::snapshot::ThreadId;
    use crate::stream::ClosePolicy;
    use crate::test_support::{FakeApi, recv_event, snapshot};
    use serde_json::json;

    struct Fixture {
        api: Arc<FakeApi>,
        controller: SessionController,
        streams: StreamManager,
        coordinator: ResumeCoordinator,
        rx: mpsc::Receiver<ClientEvent>,
    }

    impl Fixture {
        fn new() -> Self {
            let api = FakeApi::new();
            let (tx, rx) = mpsc::channel(16);
            let stages = StageNames::default();
            let streams = StreamManager::new(api.clone(), tx.clone(), ClosePolicy::new(&stages), 4);
            let coordinator =
                ResumeCoordinator::new(api.clone(), tx, ResumeResultStore::new(), stages.clone());
            Self {
                api,
                controller: SessionController::new(stages),
                streams,
                coordinator,
                rx,
            }
        }

        /// Puts the session at the review checkpoint with draft `D1`.
        fn at_review(mut self) -> Self {
            self.streams.open(ThreadId::new("T1"));
            self.controller.set_snapshot(Some(snapshot(json!({
                "thread_id": "T1", "status": "halted", "current_draft": "D1",
                "active_node": "Critic", "active_node_label": "Critic", "thread_alive": false
            }))));
            self.coordinator.observe(&self.controller.view());
            self
        }

        async fn settle(&mut self) -> Option<ReviewTransition> {
            loop {
                match recv_event(&mut self.rx).await {
                    ClientEvent::Resume(outcome) => {
                        return self.coordinator.reconcile(
                            outcome,
                            &mut self.controller,
                            &mut self.streams,
                        );
                    }
                    ClientEvent::Stream(_) => continue,
                }
            }
        }
    }

    #[tokio::test]
    async fn select_requires_review_checkpoint() {
        let mut f = Fixture::new();
        assert_eq!(
            f.coordinator.select(Decision::Approve, &f.controller),
            Err(ReviewError::NoSession)
        );
        f.controller
            .set_snapshot(Some(StatusSnapshot::new("T1", SessionStatus::Running)));
        assert_eq!(
            f.coordinator.select(Decision::Approve, &f.controller),
            Err(ReviewError::NotAwaitingReview)
        );
    }

    #[tokio::test]
    async fn observe_seeds_content_from_draft() {
        let f = Fixture::new().at_review();
        assert_eq!(f.coordinator.content(), "D1");
        assert_eq!(f.coordinator.state(), &ReviewState::Idle);
    }

    fn review_draft(f: &mut Fixture, draft: &str) {
        f.controller.set_snapshot(Some(snapshot(json!({
            "thread_id": "T1", "status": "halted", "current_draft": draft,
            "active_node": "Critic", "thread_alive": false
        }))));
        f.coordinator.observe(&f.controller.view());
    }

    #[tokio::test]
    async fn new_draft_at_same_checkpoint_replaces_unedited_content() {
        let mut f = Fixture::new().at_review();
        review_draft(&mut f, "D2");
        assert_eq!(f.coordinator.content(), "D2");
    }

    #[tokio::test]
    async fn new_draft_keeps_human_edits() {
        let mut f = Fixture::new().at_review();
        f.coordinator.edit("my notes").expect("edit");
        review_draft(&mut f, "D2");
        assert_eq!(f.coordinator.content(), "my notes");
    }

    #[tokio::test]
    async fn cancel_returns_to_idle_without_a_request() {
        let mut f = Fixture::new().at_review();
        f.coordinator
            .select(Decision::Reject, &f.controller)
            .expect("select");
        assert!(f.coordinator.cancel());
        assert_eq!(f.coordinator.state(), &ReviewState::Idle);
        assert_eq!(
            f.coordinator.confirm(&mut f.controller),
            Err(ReviewError::NoDecisionSelected)
        );
        tokio::task::yield_now().await;
        assert!(f.api.resume_calls().is_empty());
    }

    #[tokio::test]
    async fn approve_submits_shown_draft_without_restart() {
        let mut f = Fixture::new().at_review();
        let epoch = f.streams.epoch();
        f.coordinator
            .select(Decision::Approve, &f.controller)
            .expect("select");
        let sent = f.coordinator.confirm(&mut f.controller).expect("confirm");
        assert_eq!(sent.suggested_content, "D1");
        assert_eq!(sent.human_decision, Decision::Approve);

        let optimistic = f.controller.snapshot().expect("snapshot");
        assert_eq!(optimistic.status, SessionStatus::Running);
        assert_eq!(optimistic.active_node.as_deref(), Some("Finalize"));
        assert!(optimistic.thread_alive);
        assert_eq!(optimistic.current_draft.as_deref(), Some("D1"));
        assert!(!f.coordinator.controls_enabled());

        let transition = f.settle().await.expect("transition");
        assert_eq!(
            transition,
            ReviewTransition::Reconciled {
                decision: Decision::Approve,
                restarted: None
            }
        );
        assert_eq!(f.api.resume_calls().len(), 1);
        assert_eq!(f.streams.epoch(), epoch);
        assert!(f.coordinator.store().latest().is_some());
        assert!(f.coordinator.controls_enabled());
    }

    #[tokio::test]
    async fn reject_submits_instructions_and_restarts_once() {
        let mut f = Fixture::new().at_review();
        let before = f.streams.current().cloned().expect("connection");
        f.coordinator.edit("shorten it").expect("edit");
        f.coordinator
            .select(Decision::Reject, &f.controller)
            .expect("select");
        f.coordinator.confirm(&mut f.controller).expect("confirm");

        let optimistic = f.controller.snapshot().expect("snapshot");
        assert_eq!(optimistic.status, SessionStatus::Revising);
        assert_eq!(optimistic.active_node.as_deref(), Some("Drafting"));

        let transition = f.settle().await.expect("transition");
        let ReviewTransition::Reconciled {
            decision: Decision::Reject,
            restarted: Some(after),
        } = transition
        else {
            panic!("expected reconciled rejection, got {transition:?}");
        };
        assert!(after.epoch > before.epoch);
        assert_eq!(f.streams.restarts(), 1);
        assert!(f.controller.is_loading());

        let calls = f.api.resume_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].suggested_content, "shorten it");
        assert_eq!(calls[0].human_decision, Decision::Reject);
    }

    #[tokio::test]
    async fn only_one_submission_in_flight() {
        let mut f = Fixture::new().at_review();
        f.coordinator
            .select(Decision::Approve, &f.controller)
            .expect("select");
        f.coordinator.confirm(&mut f.controller).expect("confirm");
        assert_eq!(
            f.coordinator.confirm(&mut f.controller),
            Err(ReviewError::SubmissionInFlight)
        );
        assert_eq!(
            f.coordinator.select(Decision::Reject, &f.controller),
            Err(ReviewError::SubmissionInFlight)
        );
        assert_eq!(
            f.coordinator.edit("late"),
            Err(ReviewError::SubmissionInFlight)
        );
        f.settle().await;
        assert_eq!(f.api.resume_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_resume_rolls_back_and_allows_retry() {
        let mut f = Fixture::new().at_review();
        f.api.push_resume(Err(RequestError::rejected(
            RequestOperation::Resume,
            404,
            Some("Thread not found".into()),
        )));
        f.coordinator.edit("tone it down").expect("edit");
        f.coordinator
            .select(Decision::Reject, &f.controller)
            .expect("select");
        f.coordinator.confirm(&mut f.controller).expect("confirm");

        let transition = f.settle().await.expect("transition");
        assert!(matches!(transition, ReviewTransition::RolledBack { .. }));
        assert_eq!(
            f.coordinator.failure(),
            Some("Failed to resume session: Thread not found")
        );

        let reverted = f.controller.snapshot().expect("snapshot");
        assert_eq!(reverted.status, SessionStatus::Halted);
        assert!(!reverted.thread_alive);
        assert_eq!(reverted.current_draft.as_deref(), Some("D1"));
        assert_eq!(reverted.active_node.as_deref(), Some("Critic"));
        assert_eq!(f.streams.restarts(), 0);
        assert!(f.coordinator.store().latest().is_none());

        f.coordinator.observe(&f.controller.view());
        assert_eq!(f.coordinator.content(), "tone it down");
        f.coordinator
            .select(Decision::Reject, &f.controller)
            .expect("retry select");
        f.coordinator.confirm(&mut f.controller).expect("retry confirm");
        f.settle().await.expect("retry transition");
        assert_eq!(f.api.resume_calls().len(), 2);
    }

    #[tokio::test]
    async fn outcome_after_reset_is_ignored() {
        let mut f = Fixture::new().at_review();
        f.coordinator
            .select(Decision::Reject, &f.controller)
            .expect("select");
        f.coordinator.confirm(&mut f.controller).expect("confirm");
        f.coordinator.reset();
        let epoch = f.streams.epoch();
        assert_eq!(f.settle().await, None);
        assert_eq!(f.streams.epoch(), epoch);
        assert!(f.coordinator.store().latest().is_none());
    }
}
