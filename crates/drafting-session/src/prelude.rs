//! Common imports for typical session client usage.
pub use crate::{
    ClientConfig, ClientUpdate, Decision, ReviewState, ReviewTransition, SessionClient,
    SessionError, SessionStatus, SessionView, StartOptions, StatusSnapshot, ThreadId,
    init_observability,
};
