use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{SessionApi, StartOptions, StartRequest};
use crate::controller::{AlertKind, SessionAlert, SessionController};
use crate::errors::SessionError;
use crate::resume::ResumeCoordinator;
use crate::snapshot::StatusSnapshot;
use crate::stream::StreamManager;

/// Starts new drafting sessions.
///
/// All state of the previous session is dropped before the request goes out,
/// so nothing from it can leak into the new one. The shared resume-result slot
/// belongs to the caller and keeps its last value.
pub struct StartCoordinator {
    api: Arc<dyn SessionApi>,
}

impl StartCoordinator {
    pub(crate) fn new(api: Arc<dyn SessionApi>) -> Self {
        Self { api }
    }

    pub(crate) async fn start(
        &self,
        prompt: &str,
        options: StartOptions,
        controller: &mut SessionController,
        streams: &mut StreamManager,
        review: &mut ResumeCoordinator,
    ) -> Result<StatusSnapshot, SessionError> {
        if prompt.trim().is_empty() {
            return Err(SessionError::Validation("prompt must not be empty".into()));
        }

        streams.detach();
        controller.reset();
        review.reset();

        let request = StartRequest {
            user_prompt: prompt.to_string(),
            model_choice: options.model_choice,
        };
        match self.api.start_session(request).await {
            Ok(snapshot) => {
                info!(thread_id = %snapshot.thread_id, status = %snapshot.status, "session started");
                streams.open(snapshot.thread_id.clone());
                controller.begin_connecting();
                controller.set_snapshot(Some(snapshot.clone()));
                Ok(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "session start failed");
                controller.report(SessionAlert::new(AlertKind::Request, err.message()));
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientEvent;
    use crate::errors::{RequestError, RequestOperation};
    use crate::snapshot::{SessionStatus, StageNames, ThreadId};
    use crate::store::ResumeResultStore;
    use crate::stream::ClosePolicy;
    use crate::test_support::{FakeApi, snapshot};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Parts {
        controller: SessionController,
        streams: StreamManager,
        review: ResumeCoordinator,
        _rx: mpsc::Receiver<ClientEvent>,
    }

    fn parts(api: &Arc<FakeApi>) -> Parts {
        let (tx, rx) = mpsc::channel(16);
        let stages = StageNames::default();
        Parts {
            controller: SessionController::new(stages.clone()),
            streams: StreamManager::new(api.clone(), tx.clone(), ClosePolicy::new(&stages), 4),
            review: ResumeCoordinator::new(api.clone(), tx, ResumeResultStore::new(), stages),
            _rx: rx,
        }
    }

    async fn run(
        coordinator: &StartCoordinator,
        parts: &mut Parts,
        prompt: &str,
    ) -> Result<StatusSnapshot, SessionError> {
        coordinator
            .start(
                prompt,
                StartOptions::default().model_choice("anthropic"),
                &mut parts.controller,
                &mut parts.streams,
                &mut parts.review,
            )
            .await
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_without_a_request() {
        let api = FakeApi::new();
        let mut parts = parts(&api);
        let coordinator = StartCoordinator::new(api.clone());
        let err = run(&coordinator, &mut parts, "   ").await.expect_err("blank");
        assert!(matches!(err, SessionError::Validation(_)));
        assert!(api.start_calls().is_empty());
    }

    #[tokio::test]
    async fn success_adopts_thread_and_opens_one_stream() {
        let api = FakeApi::new();
        api.push_start(Ok(snapshot(json!({
            "thread_id": "T1", "status": "initializing", "thread_alive": true
        }))));
        let mut parts = parts(&api);
        let coordinator = StartCoordinator::new(api.clone());

        let started = run(&coordinator, &mut parts, "Sleep hygiene plan").await.expect("start");
        assert_eq!(started.thread_id, ThreadId::new("T1"));
        assert_eq!(parts.streams.thread_id(), Some(&ThreadId::new("T1")));
        assert!(parts.controller.is_loading());
        assert_eq!(
            parts.controller.snapshot().map(|s| s.status),
            Some(SessionStatus::Initializing)
        );

        api.feed(0).await;
        assert_eq!(api.open_count(), 1);
        let calls = api.start_calls();
        assert_eq!(calls[0].user_prompt, "Sleep hygiene plan");
        assert_eq!(calls[0].model_choice.as_deref(), Some("anthropic"));
    }

    #[tokio::test]
    async fn failure_restores_idle_and_surfaces_detail() {
        let api = FakeApi::new();
        api.push_start(Err(RequestError::rejected(
            RequestOperation::Start,
            500,
            Some("LLM provider unavailable".into()),
        )));
        let mut parts = parts(&api);
        let coordinator = StartCoordinator::new(api.clone());

        let err = run(&coordinator, &mut parts, "prompt").await.expect_err("fails");
        assert!(matches!(err, SessionError::Request(_)));
        assert_eq!(parts.streams.thread_id(), None);
        assert!(!parts.streams.is_open());
        assert!(parts.controller.snapshot().is_none());
        assert!(!parts.controller.is_loading());
        assert_eq!(parts.controller.error(), Some("LLM provider unavailable"));
        assert_eq!(
            parts.controller.alert().map(|a| a.kind),
            Some(AlertKind::Request)
        );
    }

    #[tokio::test]
    async fn new_session_discards_the_previous_one() {
        let api = FakeApi::new();
        api.push_start(Ok(StatusSnapshot::new("T1", SessionStatus::Initializing)));
        api.push_start(Ok(StatusSnapshot::new("T2", SessionStatus::Initializing)));
        let mut parts = parts(&api);
        let coordinator = StartCoordinator::new(api.clone());

        run(&coordinator, &mut parts, "first").await.expect("first");
        api.feed(0).await;
        parts.controller.set_snapshot(Some(snapshot(json!({
            "thread_id": "T1", "status": "complete", "final_cbt_plan": "F1"
        }))));
        parts
            .review
            .store()
            .publish(StatusSnapshot::new("T1", SessionStatus::Running));

        run(&coordinator, &mut parts, "second").await.expect("second");
        let held = parts.controller.snapshot().expect("snapshot");
        assert_eq!(held.thread_id, ThreadId::new("T2"));
        assert_eq!(held.final_artifact, None);
        assert_eq!(
            parts.review.store().latest().map(|s| s.thread_id),
            Some(ThreadId::new("T1"))
        );
        assert_eq!(parts.streams.current().map(|c| c.epoch), Some(2));

        api.feed(1).await;
        assert_eq!(
            api.opened_threads(),
            vec![ThreadId::new("T1"), ThreadId::new("T2")]
        );
    }
}
