//! Batch coordinator.
//!
//! Owns every batch and download in memory and is the only code that
//! touches the persistence store and the progress tree.
//!
//! # Concurrency Model
//!
//! - One task drains one unbounded command queue; each command runs to
//!   completion before the next starts, so no state here is locked
//! - Public calls and transfer events share that queue
//! - Byte transfer happens in the transfer session, outside this task
//! - Until the startup load has been reconciled, commands are held by an
//!   [`InitGate`] and replayed in arrival order
//!
//! # Failure Policy
//!
//! The first download to fail decides the batch outcome: its siblings are
//! cancelled (running transfers aborted, queued ones dropped), the batch is
//! deleted from the store, and the handle rejects with that error. Files
//! that already completed stay on disk.

mod command;
mod files;
mod gate;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use batchdl_core::{
    ActiveTransfer, BatchError, BatchId, Download, DownloadBatch, DownloadError, DownloadRequest,
    DownloadStatus, DownloadsPersistencePort, EngineError, RepositoryError, TransferEvent,
    TransferId, TransferSessionPort,
};

use crate::handle::{BatchHandle, DownloadHandle};
use crate::progress::{NodeId, ProgressObservable, ProgressTree};
use crate::queue::{DownloadKey, PendingQueue};

pub(crate) use command::{Command, CommandSender, Startup};
pub use command::DrainHandler;
use gate::{InitGate, InitPhase};

const LOG_TARGET: &str = "batchdl.download";

struct DownloadEntry {
    state: watch::Sender<Download>,
    node: NodeId,
    progress: ProgressObservable,
}

impl DownloadEntry {
    fn download(&self) -> Download {
        self.state.borrow().clone()
    }
}

struct BatchEntry {
    handle: BatchHandle,
    node: NodeId,
    progress: ProgressObservable,
    downloads: Vec<DownloadEntry>,
}

/// Why a batch ended without succeeding.
enum Termination {
    Failed { index: usize, error: DownloadError },
    Cancelled,
}

/// Dependencies of the coordinator task.
pub(crate) struct CoordinatorDeps {
    pub max_simultaneous: usize,
    pub persistence: Arc<dyn DownloadsPersistencePort>,
    pub session: Arc<dyn TransferSessionPort>,
    pub commands: CommandSender,
}

pub(crate) struct Coordinator {
    max_simultaneous: usize,
    persistence: Arc<dyn DownloadsPersistencePort>,
    session: Arc<dyn TransferSessionPort>,
    commands: CommandSender,
    gate: InitGate<Command>,
    load_error: Option<RepositoryError>,
    batches: BTreeMap<BatchId, BatchEntry>,
    transfers: HashMap<TransferId, DownloadKey>,
    queue: PendingQueue,
    tree: ProgressTree,
    observers: HashMap<NodeId, ProgressObservable>,
    drain_handler: Option<DrainHandler>,
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        Self {
            max_simultaneous: deps.max_simultaneous.max(1),
            persistence: deps.persistence,
            session: deps.session,
            commands: deps.commands,
            gate: InitGate::new(),
            load_error: None,
            batches: BTreeMap::new(),
            transfers: HashMap::new(),
            queue: PendingQueue::new(),
            tree: ProgressTree::new(),
            observers: HashMap::new(),
            drain_handler: None,
        }
    }

    /// Run until shut down or until every sender is gone.
    ///
    /// `loader` posts the startup result back into the queue.
    pub async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        loader: mpsc::UnboundedSender<Command>,
    ) {
        self.begin_initialization(loader);

        while let Some(command) = rx.recv().await {
            match command {
                Command::Shutdown { reply } => {
                    self.stop();
                    let _ = reply.send(());
                    return;
                }
                Command::Initialized(startup) => {
                    if self.gate.phase() == InitPhase::Initializing {
                        self.on_initialized(startup).await;
                    }
                }
                other => match self.gate.admit(other) {
                    Some(command) => self.handle(command).await,
                    None => tracing::trace!(
                        target: LOG_TARGET,
                        deferred = self.gate.deferred_len(),
                        "Deferred until startup completes"
                    ),
                },
            }
        }

        self.stop();
    }

    fn begin_initialization(&mut self, loader: mpsc::UnboundedSender<Command>) {
        if !self.gate.begin() {
            return;
        }

        let persistence = Arc::clone(&self.persistence);
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            let (batches, live) = tokio::join!(persistence.retrieve_all(), session.active_transfers());
            let _ = loader.send(Command::Initialized(Startup { batches, live }));
        });
    }

    async fn on_initialized(&mut self, startup: Startup) {
        match startup.batches {
            Ok(batches) => self.restore(batches, startup.live).await,
            Err(err) => {
                tracing::error!(
                    target: LOG_TARGET,
                    error = %err,
                    "Failed to load persisted batches; new work will be rejected"
                );
                for transfer in startup.live {
                    self.session.cancel(transfer.id);
                }
                self.load_error = Some(err);
            }
        }

        let deferred = self.gate.open();
        tracing::debug!(target: LOG_TARGET, deferred = deferred.len(), "Download engine ready");
        for command in deferred {
            self.handle(command).await;
        }
        self.start_pending().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { requests, reply } => {
                let result = self.submit(requests).await;
                let _ = reply.send(result);
            }
            Command::GetOngoing { reply } => {
                let result = match &self.load_error {
                    Some(err) => Err(EngineError::Persistence(err.clone())),
                    None => Ok(self.batches.values().map(|b| b.handle.clone()).collect()),
                };
                let _ = reply.send(result);
            }
            Command::Cancel { batches, reply } => {
                for batch in batches {
                    self.terminate_batch(batch, Termination::Cancelled).await;
                }
                self.start_pending().await;
                let _ = reply.send(());
            }
            Command::SetDrainHandler { handler, reply } => {
                self.drain_handler = handler;
                let _ = reply.send(());
            }
            Command::Transfer(event) => self.on_transfer(event).await,
            // Routed by `run`.
            Command::Initialized(_) | Command::Shutdown { .. } => {}
        }
    }

    // =========================================================================
    // Startup reconciliation
    // =========================================================================

    async fn restore(&mut self, batches: Vec<DownloadBatch>, mut live: Vec<ActiveTransfer>) {
        let mut changed = Vec::new();
        let mut stale = Vec::new();

        for batch in batches {
            let ended = batch.downloads.iter().any(|d| {
                matches!(
                    d.status,
                    DownloadStatus::Failed { .. } | DownloadStatus::Cancelled
                )
            });
            if ended || batch.is_completed() {
                stale.push(batch.id);
                continue;
            }

            let mut downloads = batch.downloads;
            for download in &mut downloads {
                if download.status.is_terminal() {
                    continue;
                }

                let claimed = live
                    .iter()
                    .position(|t| t.url == download.request.url)
                    .map(|position| live.swap_remove(position));

                match claimed {
                    Some(transfer) => {
                        if download.transfer_id != Some(transfer.id)
                            || download.status != DownloadStatus::Downloading
                        {
                            download.start(transfer.id);
                            changed.push(download.clone());
                        }
                        tracing::debug!(
                            target: LOG_TARGET,
                            download_id = %download.id,
                            transfer_id = %transfer.id,
                            "Reattached live transfer"
                        );
                    }
                    None => {
                        if download.transfer_id.is_some()
                            || download.status != DownloadStatus::Pending
                        {
                            download.reset();
                            changed.push(download.clone());
                        }
                    }
                }
            }

            self.track(batch.id, downloads);
        }

        for orphan in live {
            tracing::warn!(
                target: LOG_TARGET,
                transfer_id = %orphan.id,
                url = %orphan.url,
                "Cancelling live transfer with no persisted download"
            );
            self.session.cancel(orphan.id);
        }

        self.persist(&changed).await;

        if !stale.is_empty() {
            tracing::info!(target: LOG_TARGET, batches = ?stale, "Removing batches that had already ended");
            if let Err(err) = self.persistence.delete(&stale).await {
                tracing::error!(target: LOG_TARGET, error = %err, "Failed to delete ended batches");
            }
        }

        tracing::info!(
            target: LOG_TARGET,
            batches = self.batches.len(),
            running = self.transfers.len(),
            queued = self.queue.len(),
            "Restored persisted batches"
        );
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    async fn submit(&mut self, requests: Vec<DownloadRequest>) -> Result<BatchHandle, EngineError> {
        if let Some(err) = &self.load_error {
            return Err(EngineError::Persistence(err.clone()));
        }
        if requests.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let batch = self.persistence.insert(&requests).await?;
        tracing::info!(
            target: LOG_TARGET,
            batch_id = %batch.id,
            downloads = batch.downloads.len(),
            "Batch submitted"
        );

        let handle = self.track(batch.id, batch.downloads);
        self.start_pending().await;
        Ok(handle)
    }

    /// Register a batch in memory: progress nodes, observers, queue and
    /// transfer bookkeeping.
    fn track(&mut self, batch_id: BatchId, downloads: Vec<Download>) -> BatchHandle {
        let weights = batch_weights(&downloads);
        let batch_node = self.tree.add_node(0.0);

        let mut entries = Vec::with_capacity(downloads.len());
        let mut handles = Vec::with_capacity(downloads.len());

        for (index, (download, weight)) in downloads.into_iter().zip(weights).enumerate() {
            let key = DownloadKey::new(batch_id, index);
            let node = self
                .tree
                .add_node(download.request.expected_size.map_or(0.0, units));
            if download.status == DownloadStatus::Completed {
                if let Err(err) = self.tree.complete(node) {
                    tracing::warn!(target: LOG_TARGET, error = %err, "Progress tree rejected completed download");
                }
            }
            if let Err(err) = self.tree.add_child(batch_node, node, weight) {
                tracing::error!(target: LOG_TARGET, error = %err, "Progress tree rejected download");
            }

            let progress = ProgressObservable::new(self.tree.snapshot(node).unwrap_or_default());
            match (&download.status, download.transfer_id) {
                (DownloadStatus::Completed, _) => {
                    progress.finish(Ok(()));
                }
                (DownloadStatus::Downloading, Some(transfer)) => {
                    self.transfers.insert(transfer, key);
                }
                _ => self.queue.push(key),
            }
            self.observers.insert(node, progress.clone());

            let (state, receiver) = watch::channel(download);
            handles.push(DownloadHandle::new(receiver, progress.clone()));
            entries.push(DownloadEntry {
                state,
                node,
                progress,
            });
        }

        let progress = ProgressObservable::new(self.tree.snapshot(batch_node).unwrap_or_default());
        self.observers.insert(batch_node, progress.clone());

        let handle = BatchHandle::new(batch_id, handles, progress.clone(), self.commands.clone());
        self.batches.insert(
            batch_id,
            BatchEntry {
                handle: handle.clone(),
                node: batch_node,
                progress,
                downloads: entries,
            },
        );
        handle
    }

    /// Start queued downloads until the cap is reached.
    async fn start_pending(&mut self) {
        if self.load_error.is_some() {
            return;
        }
        while self.transfers.len() < self.max_simultaneous {
            let Some(key) = self.queue.pop() else { break };
            self.start_download(key).await;
        }
    }

    async fn start_download(&mut self, key: DownloadKey) {
        let Some(download) = self.entry(key).map(DownloadEntry::download) else {
            return;
        };
        if download.status != DownloadStatus::Pending {
            return;
        }

        let resume_data = files::read_resume_data(&download.request.resume_path).await;
        let resumed = resume_data.is_some();
        let transfer = self.session.start(&download.request, resume_data);
        self.transfers.insert(transfer, key);

        let Some(entry) = self.entry(key) else { return };
        entry.state.send_modify(|d| d.start(transfer));
        let updated = entry.download();

        tracing::debug!(
            target: LOG_TARGET,
            batch_id = %key.batch,
            download_id = %updated.id,
            transfer_id = %transfer,
            resumed,
            "Transfer started"
        );
        self.persist(std::slice::from_ref(&updated)).await;
    }

    // =========================================================================
    // Transfer events
    // =========================================================================

    async fn on_transfer(&mut self, event: TransferEvent) {
        tracing::trace!(target: LOG_TARGET, transfer_id = ?event.transfer_id(), "Transfer event");
        match event {
            TransferEvent::Progress {
                id,
                written,
                expected,
            } => self.on_progress(id, written, expected),
            TransferEvent::Finished { id, temp_path } => {
                let Some(key) = self.transfers.remove(&id) else {
                    tracing::warn!(
                        target: LOG_TARGET,
                        transfer_id = %id,
                        "Finished transfer has no download; discarding body"
                    );
                    files::remove_quietly(&temp_path).await;
                    return;
                };
                self.on_finished(key, temp_path).await;
                self.start_pending().await;
            }
            TransferEvent::Failed {
                id,
                error,
                resume_data,
            } => {
                let Some(key) = self.transfers.remove(&id) else {
                    tracing::warn!(target: LOG_TARGET, transfer_id = %id, error = %error, "Failed transfer has no download");
                    return;
                };
                if let (Some(data), Some(entry)) = (resume_data, self.entry(key)) {
                    let path = entry.state.borrow().request.resume_path.clone();
                    if let Err(e) = files::write_resume_data(&path, &data).await {
                        tracing::error!(
                            target: LOG_TARGET,
                            path = %path.display(),
                            error = %e,
                            "Failed to save resume data"
                        );
                    }
                }
                self.terminate_batch(key.batch, Termination::Failed {
                    index: key.index,
                    error,
                })
                .await;
                self.start_pending().await;
            }
            TransferEvent::Cancelled { id } => {
                // Transfers the engine cancels are already unregistered.
                let Some(key) = self.transfers.remove(&id) else {
                    tracing::trace!(target: LOG_TARGET, transfer_id = %id, "Cancelled transfer acknowledged");
                    return;
                };
                tracing::info!(target: LOG_TARGET, transfer_id = %id, "Transfer cancelled outside the engine");
                self.terminate_batch(key.batch, Termination::Cancelled).await;
                self.start_pending().await;
            }
            TransferEvent::EventsDrained => match self.drain_handler.take() {
                Some(handler) => {
                    tracing::debug!(target: LOG_TARGET, "Transfer events drained; notifying host");
                    handler();
                }
                None => tracing::trace!(target: LOG_TARGET, "Transfer events drained"),
            },
        }
    }

    fn on_progress(&mut self, id: TransferId, written: u64, expected: Option<u64>) {
        let Some(key) = self.transfers.get(&id).copied() else {
            tracing::trace!(target: LOG_TARGET, transfer_id = %id, "Progress for unknown transfer");
            return;
        };
        let Some(entry) = self.entry(key) else { return };

        let node = entry.node;
        let total = expected
            .or(entry.state.borrow().request.expected_size)
            .map_or(0.0, units);

        match self.tree.set_leaf(node, units(written), total) {
            Ok(changed) => self.publish(&changed),
            Err(err) => tracing::warn!(target: LOG_TARGET, error = %err, "Progress update rejected"),
        }
    }

    async fn on_finished(&mut self, key: DownloadKey, temp_path: PathBuf) {
        let Some(request) = self.entry(key).map(|e| e.state.borrow().request.clone()) else {
            files::remove_quietly(&temp_path).await;
            return;
        };

        if let Err(error) = files::move_into_place(&temp_path, &request).await {
            tracing::error!(
                target: LOG_TARGET,
                destination = %request.destination.display(),
                error = %error,
                "Failed to move downloaded file into place"
            );
            files::remove_quietly(&temp_path).await;
            self.terminate_batch(key.batch, Termination::Failed {
                index: key.index,
                error,
            })
            .await;
            return;
        }

        let Some(entry) = self.entry(key) else { return };
        entry.state.send_modify(|d| d.finish(DownloadStatus::Completed));
        let node = entry.node;
        let progress = entry.progress.clone();
        let updated = entry.download();

        tracing::debug!(target: LOG_TARGET, download_id = %updated.id, url = %request.url, "Download completed");
        self.persist(std::slice::from_ref(&updated)).await;

        match self.tree.complete(node) {
            Ok(changed) => self.publish(&changed),
            Err(err) => tracing::warn!(target: LOG_TARGET, error = %err, "Progress update rejected"),
        }
        progress.finish(Ok(()));

        let batch_done = self.batches.get(&key.batch).is_some_and(|batch| {
            batch
                .downloads
                .iter()
                .all(|d| d.state.borrow().status == DownloadStatus::Completed)
        });
        if batch_done {
            self.complete_batch(key.batch).await;
        }
    }

    // =========================================================================
    // Batch outcomes
    // =========================================================================

    async fn complete_batch(&mut self, batch_id: BatchId) {
        let Some(batch) = self.batches.remove(&batch_id) else {
            return;
        };

        if let Err(err) = self.persistence.delete(&[batch_id]).await {
            tracing::error!(target: LOG_TARGET, batch_id = %batch_id, error = %err, "Failed to delete completed batch");
        }
        self.drop_progress(batch.node);
        batch.progress.finish(Ok(()));

        tracing::info!(target: LOG_TARGET, batch_id = %batch_id, "Batch completed");
    }

    /// End a batch that did not succeed: every sibling is cancelled, the
    /// batch leaves the store, and its handle rejects.
    async fn terminate_batch(&mut self, batch_id: BatchId, termination: Termination) {
        let Some(batch) = self.batches.remove(&batch_id) else {
            return;
        };

        let (trigger, outcome) = match termination {
            Termination::Failed { index, error } => (Some((index, error.clone())), Err(BatchError::Download(error))),
            Termination::Cancelled => (None, Err(BatchError::Cancelled)),
        };

        for (index, entry) in batch.downloads.iter().enumerate() {
            let current = entry.download();
            if let Some(transfer) = current.transfer_id
                && self.transfers.remove(&transfer).is_some()
            {
                self.session.cancel(transfer);
            }

            let status = match &trigger {
                Some((failed, error)) if *failed == index => DownloadStatus::Failed {
                    error: error.clone(),
                },
                _ if current.status == DownloadStatus::Completed => continue,
                _ => DownloadStatus::Cancelled,
            };
            let result = match &status {
                DownloadStatus::Failed { error } => Err(BatchError::Download(error.clone())),
                _ => Err(BatchError::Cancelled),
            };
            entry.state.send_modify(|d| d.finish(status));
            entry.progress.finish(result);
        }

        let dropped = self.queue.remove_batch(batch_id);
        if let Err(err) = self.persistence.delete(&[batch_id]).await {
            tracing::error!(target: LOG_TARGET, batch_id = %batch_id, error = %err, "Failed to delete ended batch");
        }
        self.drop_progress(batch.node);

        match &outcome {
            Err(BatchError::Download(error)) => tracing::warn!(
                target: LOG_TARGET,
                batch_id = %batch_id,
                error = %error,
                "Batch failed"
            ),
            _ => tracing::info!(target: LOG_TARGET, batch_id = %batch_id, dropped, "Batch cancelled"),
        }
        batch.progress.finish(outcome);
    }

    /// Release every handle with [`BatchError::Stopped`]. Persisted state
    /// is left untouched so the work resumes on the next start.
    fn stop(&mut self) {
        for batch in std::mem::take(&mut self.batches).into_values() {
            for entry in &batch.downloads {
                entry.progress.finish(Err(BatchError::Stopped));
            }
            batch.progress.finish(Err(BatchError::Stopped));
        }
        self.transfers.clear();
        self.observers.clear();
        tracing::info!(target: LOG_TARGET, "Download engine stopped");
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn entry(&self, key: DownloadKey) -> Option<&DownloadEntry> {
        self.batches
            .get(&key.batch)
            .and_then(|batch| batch.downloads.get(key.index))
    }

    fn publish(&self, changed: &[NodeId]) {
        for id in changed {
            if let (Some(observer), Some(snapshot)) = (self.observers.get(id), self.tree.snapshot(*id)) {
                observer.publish(snapshot);
            }
        }
    }

    fn drop_progress(&mut self, node: NodeId) {
        for id in self.tree.remove(node) {
            self.observers.remove(&id);
        }
    }

    async fn persist(&self, downloads: &[Download]) {
        if downloads.is_empty() {
            return;
        }
        if let Err(err) = self.persistence.update_many(downloads).await {
            tracing::error!(
                target: LOG_TARGET,
                error = %err,
                downloads = downloads.len(),
                "Failed to persist download state"
            );
        }
    }
}

/// Byte counts as progress units.
#[allow(clippy::cast_precision_loss)]
fn units(bytes: u64) -> f64 {
    bytes as f64
}

/// Weight of each download inside its batch: its expected size when every
/// size is known and non-zero, otherwise equal weights.
fn batch_weights(downloads: &[Download]) -> Vec<f64> {
    let sizes: Option<Vec<u64>> = downloads
        .iter()
        .map(|d| d.request.expected_size.filter(|size| *size > 0))
        .collect();

    sizes.map_or_else(
        || vec![1.0; downloads.len()],
        |sizes| sizes.into_iter().map(units).collect(),
    )
}
