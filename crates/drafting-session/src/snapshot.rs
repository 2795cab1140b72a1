use std::collections::BTreeMap;
use std::fmt;

/// Server-assigned identifier of one drafting workflow thread.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    /// Creates a thread id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the thread id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Workflow status literal reported by the server.
///
/// Literals the client does not know decode as `Initializing`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Revising,
    Halted,
    Complete,
    #[default]
    #[serde(other)]
    Initializing,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Revising => "revising",
            Self::Halted => "halted",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the processing stages the client treats specially.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageNames {
    /// Stage at which the workflow interrupts for a human decision.
    pub hil: String,
    /// Stage reported alongside a draft that is ready for review.
    pub review: String,
    /// Routing hint written optimistically after an approval.
    pub finalize: String,
    /// Routing hint written optimistically after a rejection.
    pub drafting: String,
}

impl Default for StageNames {
    fn default() -> Self {
        Self {
            hil: "HIL_Node".to_string(),
            review: "Critic".to_string(),
            finalize: "Finalize".to_string(),
            drafting: "Drafting".to_string(),
        }
    }
}

/// Full view of a session as last observed.
///
/// Snapshots always replace one another wholesale; nothing merges two of them
/// field by field.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "WireSnapshot", into = "WireSnapshot")]
pub struct StatusSnapshot {
    pub thread_id: ThreadId,
    pub status: SessionStatus,
    pub current_draft: Option<String>,
    /// Final approved artifact (`final_cbt_plan` on the wire).
    pub final_artifact: Option<String>,
    /// Quality scores keyed by their wire name (`safety_metric`, ...).
    pub metrics: BTreeMap<String, f64>,
    pub active_node: Option<String>,
    pub active_node_label: Option<String>,
    /// Whether the backend execution thread is still running.
    pub thread_alive: bool,
    pub error: Option<String>,
    pub is_complete: bool,
    pub model_choice: Option<String>,
}

impl StatusSnapshot {
    /// Creates an otherwise empty snapshot for a thread.
    pub fn new(thread_id: impl Into<ThreadId>, status: SessionStatus) -> Self {
        Self {
            thread_id: thread_id.into(),
            status,
            current_draft: None,
            final_artifact: None,
            metrics: BTreeMap::new(),
            active_node: None,
            active_node_label: None,
            thread_alive: false,
            error: None,
            is_complete: false,
            model_choice: None,
        }
    }

    /// Decodes one JSON payload.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn is_active_node(&self, node: &str) -> bool {
        self.active_node.as_deref() == Some(node)
    }

    /// Halted at the review stage with a draft to show.
    pub fn awaits_review(&self, stages: &StageNames) -> bool {
        self.status == SessionStatus::Halted
            && self.is_active_node(&stages.review)
            && self.current_draft.is_some()
    }

    /// Halted anywhere other than the human interrupt stage.
    pub fn is_unexpected_halt(&self, stages: &StageNames) -> bool {
        self.status == SessionStatus::Halted && !self.is_active_node(&stages.hil)
    }

    /// The backend thread is gone but a final artifact was produced.
    ///
    /// A disconnect can land after the artifact exists and before a terminal
    /// status event is delivered, so this counts as success whatever `status`
    /// says.
    pub fn has_recovered_artifact(&self) -> bool {
        !self.thread_alive && self.final_artifact.is_some()
    }

    /// Graph error worth showing; the interrupt marker for the HIL stage is not
    /// one.
    pub fn graph_error(&self, stages: &StageNames) -> Option<&str> {
        let marker = format!("'{}'", stages.hil);
        self.error
            .as_deref()
            .filter(|e| !e.is_empty() && *e != marker)
    }
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct WireSnapshot {
    thread_id: ThreadId,
    status: SessionStatus,
    #[serde(default)]
    current_draft: Option<String>,
    #[serde(default)]
    final_cbt_plan: Option<String>,
    #[serde(default)]
    active_node: Option<String>,
    #[serde(default)]
    active_node_label: Option<String>,
    #[serde(default)]
    thread_alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_choice: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl From<WireSnapshot> for StatusSnapshot {
    fn from(wire: WireSnapshot) -> Self {
        let metrics = wire
            .rest
            .into_iter()
            .filter(|(key, _)| key.ends_with("_metric"))
            .filter_map(|(key, value)| value.as_f64().map(|v| (key, v)))
            .collect();
        Self {
            thread_id: wire.thread_id,
            status: wire.status,
            current_draft: wire.current_draft,
            final_artifact: wire.final_cbt_plan,
            metrics,
            active_node: wire.active_node,
            active_node_label: wire.active_node_label,
            thread_alive: wire.thread_alive.unwrap_or(false),
            error: wire.error,
            is_complete: wire.is_complete,
            model_choice: wire.model_choice,
        }
    }
}

impl From<StatusSnapshot> for WireSnapshot {
    fn from(snapshot: StatusSnapshot) -> Self {
        let rest = snapshot
            .metrics
            .into_iter()
            .map(|(key, value)| (key, serde_json::json!(value)))
            .collect();
        Self {
            thread_id: snapshot.thread_id,
            status: snapshot.status,
            current_draft: snapshot.current_draft,
            final_cbt_plan: snapshot.final_artifact,
            active_node: snapshot.active_node,
            active_node_label: snapshot.active_node_label,
            thread_alive: Some(snapshot.thread_alive),
            error: snapshot.error,
            is_complete: snapshot.is_complete,
            model_choice: snapshot.model_choice,
            rest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_server_payload() {
        let payload = serde_json::json!({
            "thread_id": "T1",
            "is_complete": false,
            "status": "halted",
            "current_draft": "D1",
            "final_cbt_plan": null,
            "safety_metric": 0.91,
            "empathy_metric": null,
            "model_choice": "openai",
            "active_node": "Critic",
            "active_node_label": "Clinical Critic",
            "thread_alive": true,
            "error": null
        })
        .to_string();
        let snapshot = StatusSnapshot::decode(&payload).expect("decode");
        assert_eq!(snapshot.thread_id, ThreadId::new("T1"));
        assert_eq!(snapshot.status, SessionStatus::Halted);
        assert_eq!(snapshot.current_draft.as_deref(), Some("D1"));
        assert_eq!(snapshot.metric("safety_metric"), Some(0.91));
        assert_eq!(snapshot.metric("empathy_metric"), None);
        assert_eq!(snapshot.model_choice.as_deref(), Some("openai"));
        assert!(snapshot.thread_alive);
        assert!(snapshot.awaits_review(&StageNames::default()));
    }

    #[test]
    fn missing_thread_alive_means_dead() {
        let snapshot =
            StatusSnapshot::decode(r#"{"thread_id":"T1","status":"running"}"#).expect("decode");
        assert!(!snapshot.thread_alive);
        assert!(snapshot.metrics.is_empty());
    }

    #[test]
    fn unknown_status_literal_is_initializing() {
        let snapshot =
            StatusSnapshot::decode(r#"{"thread_id":"T1","status":"queued"}"#).expect("decode");
        assert_eq!(snapshot.status, SessionStatus::Initializing);
    }

    #[test]
    fn status_literals_round_trip_lowercase() {
        for status in [
            SessionStatus::Initializing,
            SessionStatus::Running,
            SessionStatus::Revising,
            SessionStatus::Halted,
            SessionStatus::Complete,
        ] {
            let literal = serde_json::to_value(status).expect("encode");
            assert_eq!(literal, serde_json::Value::String(status.as_str().into()));
            let back: SessionStatus = serde_json::from_value(literal).expect("decode");
            assert_eq!(back, status);
        }
        assert_eq!(SessionStatus::default(), SessionStatus::Initializing);
    }

    #[test]
    fn malformed_payloads_fail_to_decode() {
        assert!(StatusSnapshot::decode("{not json").is_err());
        assert!(StatusSnapshot::decode(r#"{"status":"running"}"#).is_err());
    }

    #[test]
    fn non_metric_extra_fields_are_ignored() {
        let snapshot = StatusSnapshot::decode(
            r#"{"thread_id":"T1","status":"running","step":4,"tone_metric":0.4}"#,
        )
        .expect("decode");
        assert_eq!(snapshot.metrics.len(), 1);
        assert_eq!(snapshot.metric("tone_metric"), Some(0.4));
    }

    #[test]
    fn encodes_artifact_under_wire_name() {
        let mut snapshot = StatusSnapshot::new("T1", SessionStatus::Complete);
        snapshot.final_artifact = Some("F1".into());
        snapshot.metrics.insert("safety_metric".into(), 0.5);
        let value = serde_json::to_value(&snapshot).expect("encode");
        assert_eq!(value["final_cbt_plan"], "F1");
        assert_eq!(value["safety_metric"], 0.5);
        assert_eq!(value["status"], "complete");
    }

    #[test]
    fn halt_at_interrupt_stage_is_expected() {
        let stages = StageNames::default();
        let mut snapshot = StatusSnapshot::new("T1", SessionStatus::Halted);
        snapshot.active_node = Some("HIL_Node".into());
        assert!(!snapshot.is_unexpected_halt(&stages));
        snapshot.active_node = Some("Drafting".into());
        assert!(snapshot.is_unexpected_halt(&stages));
    }

    #[test]
    fn interrupt_marker_is_not_a_graph_error() {
        let stages = StageNames::default();
        let mut snapshot = StatusSnapshot::new("T1", SessionStatus::Halted);
        snapshot.error = Some("'HIL_Node'".into());
        assert_eq!(snapshot.graph_error(&stages), None);
        snapshot.error = Some("model timeout".into());
        assert_eq!(snapshot.graph_error(&stages), Some("model timeout"));
    }
}
