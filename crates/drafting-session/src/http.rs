use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::{debug, warn};

use crate::api::{PayloadStream, ResumeDecision, SessionApi, StartRequest};
use crate::config::ClientConfig;
use crate::errors::{RequestError, RequestOperation, SessionError, StreamFailure};
use crate::snapshot::{StatusSnapshot, ThreadId};
use crate::transport::SseDecoder;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// `SessionApi` backed by the drafting service's HTTP endpoints.
pub struct HttpSessionApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpSessionApi {
    /// Creates a backend from explicit client configuration.
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        config.validate()?;
        // No client-wide timeout: it would also cut the long-lived stream.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SessionError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post_for_snapshot<B: serde::Serialize + Sync>(
        &self,
        operation: RequestOperation,
        path: &str,
        body: &B,
    ) -> Result<StatusSnapshot, RequestError> {
        let mut request = self.client.post(self.config.endpoint(path)).json(body);
        if let Some(timeout) = self.config.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%operation, error = %e, "session request got no response");
            RequestError::network(operation)
        })?;
        let status = response.status();
        if !status.is_success() {
            let detail = match response.bytes().await {
                Ok(body) => extract_detail(&body),
                Err(_) => None,
            };
            warn!(%operation, status = status.as_u16(), detail = ?detail, "session request rejected");
            return Err(RequestError::rejected(operation, status.as_u16(), detail));
        }

        let body = response.bytes().await.map_err(|e| {
            warn!(%operation, error = %e, "session response body unreadable");
            RequestError::network(operation)
        })?;
        serde_json::from_slice(&body).map_err(|e| {
            RequestError::protocol(operation, format!("invalid {operation} response: {e}"))
        })
    }
}

#[async_trait::async_trait]
impl SessionApi for HttpSessionApi {
    async fn start_session(&self, request: StartRequest) -> Result<StatusSnapshot, RequestError> {
        self.post_for_snapshot(RequestOperation::Start, "start_session", &request)
            .await
    }

    async fn resume_session(
        &self,
        decision: ResumeDecision,
    ) -> Result<StatusSnapshot, RequestError> {
        self.post_for_snapshot(RequestOperation::Resume, "resume_session", &decision)
            .await
    }

    async fn open_stream(&self, thread_id: &ThreadId) -> Result<PayloadStream, StreamFailure> {
        debug!(thread_id = %thread_id, "opening session stream");
        let response = self
            .client
            .get(self.config.endpoint("stream_session_info"))
            .query(&[("thread_id", thread_id.as_str())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamFailure::Connect(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamFailure::Connect(format!(
                "stream request failed with status {status}"
            )));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(payload_stream(bytes_stream)))
    }
}

/// Pulls `detail` out of an error body; non-string details are kept as JSON.
fn extract_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

fn payload_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<String, StreamFailure>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<String>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(payload) = state.pending.pop_front() {
                    return Ok(Some((payload, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            if let Some(payload) = frame.message_payload() {
                                state.pending.push_back(payload.to_string());
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Err(StreamFailure::Dropped(format!("stream read failed: {e}")));
                    }
                    None => {
                        let leftover = state.decoder.pending_len();
                        if leftover > 0 {
                            debug!(bytes = leftover, "discarding incomplete trailing event");
                        }
                        state.done = true;
                    }
                }
            }
        },
    )
}
