//! Presentation-level reading of a snapshot.
//!
//! Rendering itself lives outside this crate; this module only decides which
//! screen a snapshot maps to so every front end applies the same rules.

use crate::snapshot::{SessionStatus, StageNames, StatusSnapshot};

/// What the main panel should show for the current snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionView<'a> {
    /// No session yet.
    Empty,
    /// The final artifact is available.
    ///
    /// `recovered` is set when the artifact was taken from a dead thread whose
    /// status never reached `complete`.
    Final { artifact: &'a str, recovered: bool },
    /// Halted at the review checkpoint; the human must approve or reject.
    AwaitingReview { draft: &'a str },
    /// Drafting, revising or finalizing.
    Working {
        draft: Option<&'a str>,
        stage_label: Option<&'a str>,
        /// The finalize stage is active (the draft is the final report).
        finalizing: bool,
        revising: bool,
        /// Show a progress indicator.
        busy: bool,
    },
    /// Halted outside the HIL stage; needs operator attention.
    ///
    /// Classified from status and stage alone, whatever `thread_alive` says.
    /// Callers that end on it should check liveness themselves.
    UnexpectedHalt {
        node: Option<&'a str>,
        draft: Option<&'a str>,
    },
}

impl<'a> SessionView<'a> {
    /// Classifies a snapshot.
    ///
    /// A dead thread with a final artifact is shown as complete before any
    /// other rule is consulted.
    pub fn classify(snapshot: Option<&'a StatusSnapshot>, stages: &StageNames) -> Self {
        let Some(snapshot) = snapshot else {
            return Self::Empty;
        };

        if let Some(artifact) = snapshot.final_artifact.as_deref() {
            if snapshot.status == SessionStatus::Complete {
                return Self::Final {
                    artifact,
                    recovered: false,
                };
            }
            if snapshot.has_recovered_artifact() {
                return Self::Final {
                    artifact,
                    recovered: true,
                };
            }
        }

        if snapshot.awaits_review(stages)
            && let Some(draft) = snapshot.current_draft.as_deref()
        {
            return Self::AwaitingReview { draft };
        }

        let draft = snapshot.current_draft.as_deref();
        if snapshot.is_unexpected_halt(stages) {
            return Self::UnexpectedHalt {
                node: snapshot.active_node.as_deref(),
                draft,
            };
        }

        let finalizing = snapshot.is_active_node(&stages.finalize);
        let in_motion = matches!(
            snapshot.status,
            SessionStatus::Running | SessionStatus::Revising
        );
        Self::Working {
            draft,
            stage_label: snapshot.active_node_label.as_deref(),
            finalizing,
            revising: snapshot.status == SessionStatus::Revising,
            busy: in_motion && !finalizing,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }

    pub fn awaits_review(&self) -> bool {
        matches!(self, Self::AwaitingReview { .. })
    }
}

/// Status line shown next to the session info.
pub fn status_label(snapshot: &StatusSnapshot) -> String {
    let base = match snapshot.status {
        SessionStatus::Complete => "COMPLETE (Finalized)",
        SessionStatus::Halted => "HALTED (Awaiting Review)",
        SessionStatus::Running => "RUNNING",
        SessionStatus::Revising => "REVISING...",
        SessionStatus::Initializing => "Initializing...",
    };
    if snapshot.thread_alive && snapshot.status != SessionStatus::Complete {
        format!("{base} (Active)")
    } else {
        base.to_string()
    }
}

/// Qualitative band for a quality score.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricBand {
    Good,
    Fair,
    Poor,
}

/// A quality score prepared for display.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricReading {
    pub name: String,
    /// Rounded to two decimals.
    pub score: f64,
    pub band: MetricBand,
}

impl MetricReading {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        let score = (value * 100.0).round() / 100.0;
        let band = if score >= 0.8 {
            MetricBand::Good
        } else if score >= 0.5 {
            MetricBand::Fair
        } else {
            MetricBand::Poor
        };
        Self {
            name: name.into(),
            score,
            band,
        }
    }
}

/// Metric readings in wire-name order.
pub fn metric_readings(snapshot: &StatusSnapshot) -> Vec<MetricReading> {
    snapshot
        .metrics
        .iter()
        .map(|(name, value)| MetricReading::new(name.clone(), *value))
        .collect()
}
