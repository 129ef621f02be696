//! In-process change feed
//!
//! Handlers publish after a successful write; clients listening on a
//! community's SSE stream refetch whatever table changed. Delivery is
//! best-effort: nobody listening is fine, and lagged receivers skip ahead.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// One row-level change, scoped to a community
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub community_id: Uuid,
    pub table: &'static str,
    pub action: ChangeAction,
    pub id: Uuid,
}

impl ChangeEvent {
    pub fn new(community_id: Uuid, table: &'static str, action: ChangeAction, id: Uuid) -> Self {
        Self {
            community_id,
            table,
            action,
            id,
        }
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // Err only means there are no subscribers right now
        if self.sender.send(event).is_err() {
            tracing::trace!("change event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
