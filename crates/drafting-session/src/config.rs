use std::time::Duration;

use crate::errors::SessionError;
use crate::snapshot::StageNames;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_MAX_STREAM_RESTARTS: u32 = 16;
const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 128;

/// Configuration for the session client and its HTTP backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the drafting service.
    pub base_url: String,
    /// Optional timeout for start/resume calls. The push stream is never timed
    /// out client-side.
    pub request_timeout: Option<Duration>,
    /// Explicit restarts allowed per thread.
    pub max_stream_restarts: u32,
    /// Bounded queue between connection/request tasks and the event loop.
    pub event_buffer_capacity: usize,
    /// Stage names with special meaning to the client.
    pub stages: StageNames,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
            max_stream_restarts: DEFAULT_MAX_STREAM_RESTARTS,
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
            stages: StageNames::default(),
        }
    }
}

impl ClientConfig {
    /// Builds a config from the process environment.
    ///
    /// - `DRAFTING_API_BASE_URL`
    /// - `DRAFTING_REQUEST_TIMEOUT_SECS`
    /// - `DRAFTING_MAX_STREAM_RESTARTS`
    /// - `DRAFTING_HIL_NODE`, `DRAFTING_REVIEW_NODE`
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = get("DRAFTING_API_BASE_URL") {
            config.base_url = url.trim().to_string();
        }
        if let Some(raw) = get("DRAFTING_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env("DRAFTING_REQUEST_TIMEOUT_SECS", &raw)?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = get("DRAFTING_MAX_STREAM_RESTARTS") {
            config.max_stream_restarts = parse_env("DRAFTING_MAX_STREAM_RESTARTS", &raw)?;
        }
        if let Some(node) = get("DRAFTING_HIL_NODE") {
            config.stages.hil = node;
        }
        if let Some(node) = get("DRAFTING_REVIEW_NODE") {
            config.stages.review = node;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the service base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets a timeout for start/resume calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_stream_restarts(mut self, max: u32) -> Self {
        self.max_stream_restarts = max;
        self
    }

    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    pub fn stages(mut self, stages: StageNames) -> Self {
        self.stages = stages;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.base_url.trim().is_empty() {
            return Err(SessionError::Config("base_url must not be empty".into()));
        }
        if self.event_buffer_capacity == 0 {
            return Err(SessionError::Config(
                "event_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, SessionError> {
    raw.trim()
        .parse()
        .map_err(|_| SessionError::Config(format!("invalid value for {key}: {raw:?}")))
}
