//! Optional progress pub/sub keyed by `(userId, accountId)`. Spec.md §6.
//! Orchestrator and pipeline publish monotonically increasing `progress`
//! values for a given execution; nothing downstream depends on delivery,
//! so a lagging or absent subscriber never blocks the pipeline.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStage {
    Connecting,
    Fetching,
    Storing,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProgressCounters {
    pub processed: i64,
    pub failed: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub user_id: i32,
    pub email_account_id: i32,
    pub stage: ProgressStage,
    pub progress: u8,
    pub counters: ProgressCounters,
}

pub trait ProgressSink: Send + Sync {
    fn publish(&self, update: ProgressUpdate);
}

/// `tokio::sync::broadcast`-backed sink. Cloning shares the same channel;
/// subscribers that fall behind simply miss the oldest updates rather than
/// blocking publication.
#[derive(Clone)]
pub struct BroadcastProgressSink {
    sender: broadcast::Sender<ProgressUpdate>,
}

impl BroadcastProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn publish(&self, update: ProgressUpdate) {
        // No subscribers is the common case outside of an attached UI; a
        // send error here just means nobody is listening right now.
        let _ = self.sender.send(update);
    }
}

/// Default sink used when nothing is attached; publishing is a no-op.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn publish(&self, _update: ProgressUpdate) {}
}
