//! HTTP transfer session backed by `reqwest`.
//!
//! Each transfer runs in its own task and streams the response body into a
//! temporary file. Cancellation is handled with `tokio::select!` around the
//! transfer future; dropping the session cancels everything it started.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use batchdl_core::{
    ActiveTransfer, DownloadError, DownloadRequest, EngineConfig, TransferEvent,
    TransferEventSink, TransferId, TransferSessionPort,
};

use super::resume::ResumeToken;
use super::throttle::ProgressThrottle;

const LOG_TARGET: &str = "batchdl.session";

/// Errors building the HTTP session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Everything needed to build an [`HttpTransferSession`] except its sink.
///
/// Building the client can fail; attaching the sink cannot, which lets the
/// engine hand over its sink from an infallible factory.
pub struct HttpSessionBuilder {
    client: reqwest::Client,
    temp_directory: PathBuf,
    progress_interval: Duration,
}

impl HttpSessionBuilder {
    /// Build the HTTP client from `config`.
    pub fn new(config: &EngineConfig) -> Result<Self, SessionError> {
        let mut client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            client = client.timeout(timeout);
        }

        Ok(Self {
            client: client.build()?,
            temp_directory: config.temp_directory.clone(),
            progress_interval: config.progress_interval,
        })
    }

    /// Attach the event sink.
    pub fn build(self, sink: Arc<dyn TransferEventSink>) -> HttpTransferSession {
        HttpTransferSession {
            shared: Arc::new(Shared {
                client: self.client,
                temp_directory: self.temp_directory,
                progress_interval: self.progress_interval,
                sink,
                next_id: AtomicU64::new(1),
                active: Mutex::new(HashMap::new()),
            }),
            root: CancellationToken::new(),
        }
    }
}

struct ActiveEntry {
    url: String,
    cancel: CancellationToken,
}

struct Shared {
    client: reqwest::Client,
    temp_directory: PathBuf,
    progress_interval: Duration,
    sink: Arc<dyn TransferEventSink>,
    next_id: AtomicU64,
    active: Mutex<HashMap<TransferId, ActiveEntry>>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, HashMap<TransferId, ActiveEntry>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transfer session performing plain HTTP GETs.
///
/// Transfers live only as long as the process; after a restart
/// `active_transfers` is empty and the engine restarts pending work from
/// its resume data.
pub struct HttpTransferSession {
    shared: Arc<Shared>,
    root: CancellationToken,
}

impl Drop for HttpTransferSession {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[async_trait]
impl TransferSessionPort for HttpTransferSession {
    fn start(&self, request: &DownloadRequest, resume_data: Option<Vec<u8>>) -> TransferId {
        let id = TransferId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = self.root.child_token();

        self.shared.active().insert(
            id,
            ActiveEntry {
                url: request.url.clone(),
                cancel: cancel.clone(),
            },
        );

        let shared = Arc::clone(&self.shared);
        let request = request.clone();
        tokio::spawn(async move {
            run_transfer(shared, id, request, resume_data, cancel).await;
        });

        id
    }

    fn cancel(&self, id: TransferId) {
        if let Some(entry) = self.shared.active().get(&id) {
            entry.cancel.cancel();
        }
    }

    async fn active_transfers(&self) -> Vec<ActiveTransfer> {
        self.shared
            .active()
            .iter()
            .map(|(id, entry)| ActiveTransfer {
                id: *id,
                url: entry.url.clone(),
            })
            .collect()
    }
}

/// How one attempt ended.
enum Outcome {
    Done,
    Failed(DownloadError),
    Cancelled,
}

async fn run_transfer(
    shared: Arc<Shared>,
    id: TransferId,
    request: DownloadRequest,
    resume_data: Option<Vec<u8>>,
    cancel: CancellationToken,
) {
    let resume = match resume_data.as_deref().and_then(ResumeToken::decode) {
        Some(token) => token
            .usable_offset(&request.url)
            .await
            .map(|offset| (token.partial_path, offset)),
        None => None,
    };
    let (partial, resume_from) = resume.unwrap_or_else(|| {
        let name = format!("transfer-{}-{}.part", id, uuid::Uuid::new_v4());
        (shared.temp_directory.join(name), 0)
    });

    tracing::debug!(
        target: LOG_TARGET,
        transfer_id = %id,
        url = %request.url,
        resume_from,
        "Transfer running"
    );

    let mut written = 0;
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => Outcome::Cancelled,
        result = fetch(&shared, id, &request.url, &partial, resume_from, &mut written) => match result {
            Ok(()) => Outcome::Done,
            Err(error) => Outcome::Failed(error),
        },
    };

    let event = match outcome {
        Outcome::Done => TransferEvent::Finished {
            id,
            temp_path: partial,
        },
        Outcome::Failed(error) => {
            let resume_data = if written > 0 {
                ResumeToken {
                    url: request.url.clone(),
                    partial_path: partial,
                    bytes_written: written,
                }
                .encode()
            } else {
                remove_partial(&partial).await;
                None
            };
            tracing::debug!(target: LOG_TARGET, transfer_id = %id, error = %error, written, "Transfer failed");
            TransferEvent::Failed {
                id,
                error,
                resume_data,
            }
        }
        Outcome::Cancelled => {
            remove_partial(&partial).await;
            TransferEvent::Cancelled { id }
        }
    };

    let drained = {
        let mut active = shared.active();
        active.remove(&id);
        active.is_empty()
    };

    shared.sink.emit(event);
    if drained {
        shared.sink.emit(TransferEvent::EventsDrained);
    }
}

/// Stream `url` into `partial`, continuing from `resume_from` when the
/// server honours the range.
async fn fetch(
    shared: &Shared,
    id: TransferId,
    url: &str,
    partial: &Path,
    resume_from: u64,
    written: &mut u64,
) -> Result<(), DownloadError> {
    tokio::fs::create_dir_all(&shared.temp_directory)
        .await
        .map_err(|e| DownloadError::from_io_error(&e))?;

    let mut request = shared.client.get(url);
    if resume_from > 0 {
        request = request.header(RANGE, format!("bytes={resume_from}-"));
    }

    let response = request.send().await.map_err(|e| classify(&e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Server {
            status: status.as_u16(),
        });
    }

    let appending = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
    let mut file = if appending {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(partial)
            .await
    } else {
        tokio::fs::File::create(partial).await
    }
    .map_err(|e| DownloadError::from_io_error(&e))?;

    *written = if appending { resume_from } else { 0 };
    let expected = response.content_length().map(|len| len + *written);
    let mut throttle = ProgressThrottle::new(shared.progress_interval);

    shared.sink.emit(TransferEvent::Progress {
        id,
        written: *written,
        expected,
    });
    throttle.should_emit(Instant::now());

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify(&e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::from_io_error(&e))?;
        *written += chunk.len() as u64;

        if throttle.should_emit(Instant::now()) {
            shared.sink.emit(TransferEvent::Progress {
                id,
                written: *written,
                expected,
            });
        }
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::from_io_error(&e))?;

    shared.sink.emit(TransferEvent::Progress {
        id,
        written: *written,
        expected: expected.or(Some(*written)),
    });
    Ok(())
}

/// Map a transport error onto the engine's error kinds.
fn classify(err: &reqwest::Error) -> DownloadError {
    if err.is_timeout() {
        DownloadError::Timeout
    } else if err.is_connect() {
        DownloadError::ServerUnreachable
    } else if err.is_body() || err.is_decode() || err.is_request() {
        DownloadError::ConnectionLost
    } else {
        DownloadError::unknown(err.to_string())
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::debug!(target: LOG_TARGET, path = %path.display(), error = %e, "Could not remove partial body");
    }
}
