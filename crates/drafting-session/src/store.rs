use std::sync::Arc;

use tokio::sync::watch;

use crate::snapshot::StatusSnapshot;

/// Shared slot holding the response of the last successful resume call.
///
/// The resume coordinator writes it; any number of readers hold a clone or a
/// subscription. Cloning shares the same slot.
#[derive(Clone)]
pub struct ResumeResultStore {
    tx: Arc<watch::Sender<Option<StatusSnapshot>>>,
}

impl Default for ResumeResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResumeResultStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the stored result and wakes subscribers.
    pub fn publish(&self, snapshot: StatusSnapshot) {
        self.tx.send_replace(Some(snapshot));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Returns a copy of the stored result.
    pub fn latest(&self) -> Option<StatusSnapshot> {
        self.tx.borrow().clone()
    }

    /// Subscribes to future changes of the slot.
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.tx.subscribe()
    }
}
