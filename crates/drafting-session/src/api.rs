use std::fmt;
use std::pin::Pin;

use crate::errors::{RequestError, StreamFailure};
use crate::snapshot::{StatusSnapshot, ThreadId};

/// Body of `POST /start_session`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StartRequest {
    pub user_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_choice: Option<String>,
}

/// Caller-tunable options for starting a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Backend model family (for example `openai` or `anthropic`).
    pub model_choice: Option<String>,
}

impl StartOptions {
    pub fn model_choice(mut self, model: impl Into<String>) -> Self {
        self.model_choice = Some(model.into());
        self
    }
}

/// Human verdict on a draft at the review checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Decision {
    Approve,
    Reject,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "Approve",
            Self::Reject => "Reject",
        })
    }
}

/// Body of `POST /resume_session`: one confirmed human decision.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResumeDecision {
    pub thread_id: ThreadId,
    /// The accepted draft on approval, revision instructions on rejection.
    pub suggested_content: String,
    pub human_decision: Decision,
}

/// Raw event payloads of one push-stream connection, in arrival order.
pub type PayloadStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, StreamFailure>> + Send + 'static>>;

/// Backend contract used by the session client.
///
/// `HttpSessionApi` talks to the real service; tests substitute scripted fakes.
#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    /// Starts a new drafting thread.
    async fn start_session(&self, request: StartRequest) -> Result<StatusSnapshot, RequestError>;

    /// Submits a human decision for a halted thread.
    async fn resume_session(
        &self,
        decision: ResumeDecision,
    ) -> Result<StatusSnapshot, RequestError>;

    /// Opens the status push stream for a thread.
    ///
    /// Each item is the data of one message event; decoding into snapshots is
    /// left to the caller so malformed payloads can be reported without
    /// ending the stream.
    async fn open_stream(&self, thread_id: &ThreadId) -> Result<PayloadStream, StreamFailure>;
}
