use drafting_session::{
    MetricBand, SessionView, StageNames, StatusSnapshot, metric_readings, status_label,
};

/// One-line summary of a snapshot.
pub fn status_line(snapshot: &StatusSnapshot) -> String {
    let mut line = format!("[{}] {}", snapshot.thread_id, status_label(snapshot));
    if let Some(label) = snapshot
        .active_node_label
        .as_deref()
        .or(snapshot.active_node.as_deref())
    {
        line.push_str(" | ");
        line.push_str(label);
    }
    line
}

pub fn metric_lines(snapshot: &StatusSnapshot) -> Vec<String> {
    metric_readings(snapshot)
        .into_iter()
        .map(|reading| {
            let band = match reading.band {
                MetricBand::Good => "good",
                MetricBand::Fair => "fair",
                MetricBand::Poor => "poor",
            };
            format!("  {:<24} {:.2} ({band})", reading.name, reading.score)
        })
        .collect()
}

/// Text block for the main panel.
pub fn view_block(view: &SessionView<'_>) -> Option<String> {
    match view {
        SessionView::Empty => None,
        SessionView::Final { artifact, recovered } => {
            let heading = if *recovered {
                "== Final plan (recovered after disconnect) =="
            } else {
                "== Final plan =="
            };
            Some(format!("{heading}\n{artifact}"))
        }
        SessionView::AwaitingReview { draft } => Some(format!(
            "== Draft awaiting review ==\n{draft}\n\napprove, or reject with instructions (type 'help')"
        )),
        SessionView::Working {
            draft, finalizing, ..
        } => draft.map(|draft| {
            let heading = if *finalizing {
                "== Final report =="
            } else {
                "== Current draft =="
            };
            format!("{heading}\n{draft}")
        }),
        SessionView::UnexpectedHalt { node, .. } => Some(format!(
            "session halted unexpectedly at {}; it needs operator attention",
            node.unwrap_or("an unknown stage")
        )),
    }
}

/// Whether the terminal loop keeps going after a view change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Done,
    Failed,
}

/// An unexpected halt only ends the loop once the backend thread is gone.
pub fn verdict(view: &SessionView<'_>, snapshot: Option<&StatusSnapshot>) -> Verdict {
    match view {
        SessionView::Final { .. } => Verdict::Done,
        SessionView::UnexpectedHalt { .. } if !snapshot.is_some_and(|s| s.thread_alive) => {
            Verdict::Failed
        }
        _ => Verdict::Continue,
    }
}

/// Backend error worth showing, if any.
pub fn graph_error_line(snapshot: &StatusSnapshot, stages: &StageNames) -> Option<String> {
    snapshot
        .graph_error(stages)
        .map(|err| format!("backend error: {err}"))
}
