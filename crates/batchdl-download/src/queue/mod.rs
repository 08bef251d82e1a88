//! Global FIFO of downloads waiting for a transfer slot.
//!
//! Entries from every batch share one queue, so a later batch never
//! overtakes an earlier one. This is a pure sync state machine
//! (no async, no IO, no tracing).

use std::collections::VecDeque;

use batchdl_core::BatchId;

/// Position of a download inside the coordinator's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadKey {
    /// Owning batch.
    pub batch: BatchId,
    /// Index in the batch's submission order.
    pub index: usize,
}

impl DownloadKey {
    /// Create a key.
    pub const fn new(batch: BatchId, index: usize) -> Self {
        Self { batch, index }
    }
}

/// FIFO of pending downloads.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<DownloadKey>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a download.
    pub fn push(&mut self, key: DownloadKey) {
        self.items.push_back(key);
    }

    /// Append every index of a batch, in order.
    pub fn push_batch(&mut self, batch: BatchId, indices: impl IntoIterator<Item = usize>) {
        self.items
            .extend(indices.into_iter().map(|index| DownloadKey::new(batch, index)));
    }

    /// Take the oldest entry.
    pub fn pop(&mut self) -> Option<DownloadKey> {
        self.items.pop_front()
    }

    /// Drop every entry of a batch. Returns how many were removed.
    pub fn remove_batch(&mut self, batch: BatchId) -> usize {
        let before = self.items.len();
        self.items.retain(|key| key.batch != batch);
        before - self.items.len()
    }

    /// Whether a download is waiting.
    pub fn contains(&self, key: DownloadKey) -> bool {
        self.items.contains(&key)
    }

    /// Number of waiting downloads.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
