//! Caller-facing handles for batches and their downloads.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::watch;

use batchdl_core::{BatchError, BatchId, Download, DownloadRequest, DownloadStatus, TransferId};

use crate::coordinator::{Command, CommandSender};
use crate::progress::ProgressObservable;

/// View of one download inside a batch.
#[derive(Clone)]
pub struct DownloadHandle {
    state: watch::Receiver<Download>,
    progress: ProgressObservable,
}

impl DownloadHandle {
    pub(crate) const fn new(state: watch::Receiver<Download>, progress: ProgressObservable) -> Self {
        Self { state, progress }
    }

    /// The request this download was created from.
    pub fn request(&self) -> DownloadRequest {
        self.state.borrow().request.clone()
    }

    /// Current status.
    pub fn status(&self) -> DownloadStatus {
        self.state.borrow().status.clone()
    }

    /// The transfer carrying this download, while one is running.
    pub fn transfer_id(&self) -> Option<TransferId> {
        self.state.borrow().transfer_id
    }

    /// A snapshot of the persisted row.
    pub fn snapshot(&self) -> Download {
        self.state.borrow().clone()
    }

    /// Receiver notified on every status or transfer change.
    pub fn watch(&self) -> watch::Receiver<Download> {
        self.state.clone()
    }

    /// Byte progress of this download.
    pub const fn progress(&self) -> &ProgressObservable {
        &self.progress
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("download", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

struct BatchInner {
    id: BatchId,
    requests: Vec<DownloadRequest>,
    downloads: Vec<DownloadHandle>,
    progress: ProgressObservable,
    commands: CommandSender,
}

/// A submitted batch.
///
/// Cheap to clone. Handles compare equal when they refer to the same batch.
#[derive(Clone)]
pub struct BatchHandle {
    inner: Arc<BatchInner>,
}

impl BatchHandle {
    pub(crate) fn new(
        id: BatchId,
        downloads: Vec<DownloadHandle>,
        progress: ProgressObservable,
        commands: CommandSender,
    ) -> Self {
        let requests = downloads.iter().map(DownloadHandle::request).collect();
        Self {
            inner: Arc::new(BatchInner {
                id,
                requests,
                downloads,
                progress,
                commands,
            }),
        }
    }

    /// Store-assigned batch id.
    pub fn id(&self) -> BatchId {
        self.inner.id
    }

    /// The submitted requests, in order.
    pub fn requests(&self) -> &[DownloadRequest] {
        &self.inner.requests
    }

    /// The download created for `request`, if it belongs to this batch.
    pub fn details(&self, request: &DownloadRequest) -> Option<&DownloadHandle> {
        self.inner
            .requests
            .iter()
            .position(|r| r == request)
            .and_then(|index| self.inner.downloads.get(index))
    }

    /// All downloads, in submission order.
    pub fn downloads(&self) -> &[DownloadHandle] {
        &self.inner.downloads
    }

    /// Progress over the whole batch.
    pub fn progress(&self) -> &ProgressObservable {
        &self.inner.progress
    }

    /// The terminal outcome, once there is one.
    pub fn outcome(&self) -> Option<Result<(), BatchError>> {
        self.inner.progress.outcome()
    }

    /// Wait until every download completes, or the batch fails or is
    /// cancelled.
    pub async fn wait(&self) -> Result<(), BatchError> {
        self.inner.progress.wait().await
    }

    /// Cancel this batch.
    ///
    /// Resolves once the cancellation has been applied. A no-op if the
    /// engine has stopped or the batch already finished.
    pub async fn cancel(&self) {
        let batches = vec![self.inner.id];
        if self
            .inner
            .commands
            .request(|reply| Command::Cancel { batches, reply })
            .await
            .is_err()
        {
            tracing::debug!(batch_id = %self.inner.id, "Cancel ignored; engine stopped");
        }
    }
}

impl PartialEq for BatchHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for BatchHandle {}

impl Hash for BatchHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle")
            .field("id", &self.inner.id)
            .field("downloads", &self.inner.downloads.len())
            .field("progress", &self.inner.progress)
            .finish()
    }
}
