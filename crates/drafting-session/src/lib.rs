//! Client-side session tracking for server-orchestrated drafting workflows.
//!
//! A session is started with a prompt, then followed through a push stream of
//! status snapshots. When the workflow halts at the review checkpoint, a human
//! approves the draft or rejects it with revision instructions; rejection
//! reopens the stream so drafting can continue.
//!
//! # Usage
//!
//! ```no_run
//! use drafting_session::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), SessionError> {
//! let mut client = SessionClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .build()?;
//!
//! client
//!     .start("Plan for managing insomnia", StartOptions::default().model_choice("openai"))
//!     .await?;
//!
//! while let Some(update) = client.next_update().await {
//!     match client.view() {
//!         SessionView::AwaitingReview { .. } => {
//!             client.select_decision(Decision::Approve)?;
//!             client.confirm_decision()?;
//!         }
//!         SessionView::Final { artifact, .. } => {
//!             println!("{artifact}");
//!             break;
//!         }
//!         _ => {}
//!     }
//!     if let ClientUpdate::ConnectionLost { surfaced: true, .. } = update {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Request/response bodies and the backend contract.
pub mod api;
/// Session client, its builder and the event loop.
pub mod client;
/// Client configuration.
pub mod config;
/// Canonical session state and alerts.
pub mod controller;
/// Public error types.
pub mod errors;
/// HTTP implementation of the backend contract.
pub mod http;
/// Logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Human review state machine.
pub mod resume;
/// Status snapshot model.
pub mod snapshot;
/// Session start.
pub mod start;
/// Shared slot for resume results.
pub mod store;
/// Push-stream connections and the close policy.
pub mod stream;
mod transport;
/// Presentation helpers.
pub mod view;

#[cfg(test)]
mod test_support;

pub use api::{Decision, PayloadStream, ResumeDecision, SessionApi, StartOptions, StartRequest};
pub use client::{ClientUpdate, SessionClient, SessionClientBuilder};
pub use config::ClientConfig;
pub use controller::{AlertKind, SessionAlert, SessionController};
pub use errors::{
    RequestError, RequestOperation, ReviewError, SessionError, StreamError, StreamFailure,
};
pub use http::HttpSessionApi;
pub use observability::init_observability;
pub use resume::{ResumeCoordinator, ReviewState, ReviewTransition};
pub use snapshot::{SessionStatus, StageNames, StatusSnapshot, ThreadId};
pub use start::StartCoordinator;
pub use store::ResumeResultStore;
pub use stream::{CloseReason, ClosePolicy, ConnectionId, StreamManager, StreamUpdate};
pub use view::{MetricBand, MetricReading, SessionView, metric_readings, status_label};
