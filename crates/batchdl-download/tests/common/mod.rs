//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use batchdl_core::{
    ActiveTransfer, BatchId, Download, DownloadBatch, DownloadError, DownloadRequest,
    DownloadsPersistencePort, EngineConfig, RepositoryError, TransferEvent, TransferEventSink,
    TransferId, TransferSessionPort,
};
use batchdl_download::{DownloadEngine, DownloadEngineDeps};

/// Ids handed out by the fake; far above anything a test presets as live.
pub const FIRST_TRANSFER_ID: u64 = 1000;

/// A `start` call observed by the fake session.
#[derive(Debug, Clone)]
pub struct Started {
    pub id: TransferId,
    pub request: DownloadRequest,
    pub resume_data: Option<Vec<u8>>,
}

/// Transfer session driven by the test.
pub struct FakeSession {
    sink: Arc<dyn TransferEventSink>,
    next_id: AtomicU64,
    live: Mutex<Vec<ActiveTransfer>>,
    started: mpsc::UnboundedSender<Started>,
    cancelled: Mutex<Vec<TransferId>>,
}

impl FakeSession {
    pub fn emit(&self, event: TransferEvent) {
        self.sink.emit(event);
    }

    pub fn progress(&self, id: TransferId, written: u64, expected: Option<u64>) {
        self.emit(TransferEvent::Progress {
            id,
            written,
            expected,
        });
    }

    pub fn finish(&self, id: TransferId, temp_path: impl Into<PathBuf>) {
        self.emit(TransferEvent::Finished {
            id,
            temp_path: temp_path.into(),
        });
    }

    pub fn fail(&self, id: TransferId, error: DownloadError, resume_data: Option<&[u8]>) {
        self.emit(TransferEvent::Failed {
            id,
            error,
            resume_data: resume_data.map(<[u8]>::to_vec),
        });
    }

    pub fn cancelled(&self) -> Vec<TransferId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// How many transfers have been started.
    pub fn start_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - FIRST_TRANSFER_ID
    }
}

#[async_trait]
impl TransferSessionPort for FakeSession {
    fn start(&self, request: &DownloadRequest, resume_data: Option<Vec<u8>>) -> TransferId {
        let id = TransferId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().push(ActiveTransfer {
            id,
            url: request.url.clone(),
        });
        let _ = self.started.send(Started {
            id,
            request: request.clone(),
            resume_data,
        });
        id
    }

    fn cancel(&self, id: TransferId) {
        self.cancelled.lock().unwrap().push(id);
        self.live.lock().unwrap().retain(|t| t.id != id);
    }

    async fn active_transfers(&self) -> Vec<ActiveTransfer> {
        self.live.lock().unwrap().clone()
    }
}

/// A running engine wired to a [`FakeSession`].
pub struct Harness {
    pub engine: DownloadEngine,
    pub session: Arc<FakeSession>,
    started: mpsc::UnboundedReceiver<Started>,
}

impl Harness {
    pub fn start(persistence: Arc<dyn DownloadsPersistencePort>, max_simultaneous: usize) -> Self {
        Self::start_with_live(persistence, max_simultaneous, Vec::new())
    }

    pub fn start_with_live(
        persistence: Arc<dyn DownloadsPersistencePort>,
        max_simultaneous: usize,
        live: Vec<ActiveTransfer>,
    ) -> Self {
        let (tx, started) = mpsc::unbounded_channel();
        let mut slot = None;

        let engine = DownloadEngine::start(
            DownloadEngineDeps {
                config: EngineConfig::with_max_simultaneous(max_simultaneous),
                persistence,
            },
            |sink| -> Arc<dyn TransferSessionPort> {
                let session = Arc::new(FakeSession {
                    sink,
                    next_id: AtomicU64::new(FIRST_TRANSFER_ID),
                    live: Mutex::new(live),
                    started: tx,
                    cancelled: Mutex::new(Vec::new()),
                });
                slot = Some(Arc::clone(&session));
                session
            },
        );

        Self {
            engine,
            session: slot.expect("session factory was called"),
            started,
        }
    }

    /// The next transfer the engine started.
    pub async fn next_started(&mut self) -> Started {
        tokio::time::timeout(Duration::from_secs(5), self.started.recv())
            .await
            .expect("timed out waiting for a transfer to start")
            .expect("session dropped")
    }

    /// A transfer start that already happened, if any.
    pub fn try_started(&mut self) -> Option<Started> {
        self.started.try_recv().ok()
    }

    /// Round-trip through the engine queue so earlier events are processed.
    pub async fn settle(&self) {
        let _ = self.engine.get_ongoing().await;
    }
}

/// `n` requests with destinations under `dir`.
pub fn requests(dir: &Path, n: usize) -> Vec<DownloadRequest> {
    (0..n)
        .map(|i| {
            DownloadRequest::new(
                format!("https://files.example.com/item-{i}.bin"),
                dir.join(format!("out/item-{i}.bin")),
            )
        })
        .collect()
}

/// Write a transfer body to a temp file and return its path.
pub fn body(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(format!("{name}.part"));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Persistence whose initial load waits for [`GatedPersistence::release`].
pub struct GatedPersistence {
    inner: Arc<dyn DownloadsPersistencePort>,
    gate: Notify,
}

impl GatedPersistence {
    pub fn new(inner: Arc<dyn DownloadsPersistencePort>) -> Self {
        Self {
            inner,
            gate: Notify::new(),
        }
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl DownloadsPersistencePort for GatedPersistence {
    async fn retrieve_all(&self) -> Result<Vec<DownloadBatch>, RepositoryError> {
        self.gate.notified().await;
        self.inner.retrieve_all().await
    }

    async fn insert(&self, requests: &[DownloadRequest]) -> Result<DownloadBatch, RepositoryError> {
        self.inner.insert(requests).await
    }

    async fn update_many(&self, downloads: &[Download]) -> Result<(), RepositoryError> {
        self.inner.update_many(downloads).await
    }

    async fn delete(&self, batch_ids: &[BatchId]) -> Result<(), RepositoryError> {
        self.inner.delete(batch_ids).await
    }
}

/// Persistence that cannot load anything.
pub struct BrokenPersistence;

#[async_trait]
impl DownloadsPersistencePort for BrokenPersistence {
    async fn retrieve_all(&self) -> Result<Vec<DownloadBatch>, RepositoryError> {
        Err(RepositoryError::Storage("disk I/O error".into()))
    }

    async fn insert(&self, _requests: &[DownloadRequest]) -> Result<DownloadBatch, RepositoryError> {
        Err(RepositoryError::Storage("disk I/O error".into()))
    }

    async fn update_many(&self, _downloads: &[Download]) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn delete(&self, _batch_ids: &[BatchId]) -> Result<(), RepositoryError> {
        Ok(())
    }
}
