//! Messages processed by the coordinator.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use batchdl_core::{
    ActiveTransfer, BatchId, DownloadBatch, DownloadRequest, EngineError, RepositoryError,
    TransferEvent, TransferEventSink,
};

use crate::handle::BatchHandle;

/// Host callback run once after the transfer session drains.
pub type DrainHandler = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Everything loaded by the startup pass.
pub(crate) struct Startup {
    pub batches: Result<Vec<DownloadBatch>, RepositoryError>,
    pub live: Vec<ActiveTransfer>,
}

/// One unit of work for the coordinator's queue.
pub(crate) enum Command {
    Submit {
        requests: Vec<DownloadRequest>,
        reply: oneshot::Sender<Result<BatchHandle, EngineError>>,
    },
    GetOngoing {
        reply: oneshot::Sender<Result<Vec<BatchHandle>, EngineError>>,
    },
    Cancel {
        batches: Vec<BatchId>,
        reply: oneshot::Sender<()>,
    },
    SetDrainHandler {
        handler: Option<DrainHandler>,
        reply: oneshot::Sender<()>,
    },
    Transfer(TransferEvent),
    Initialized(Startup),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Weak handle to the coordinator's queue.
///
/// Held by batch handles and the transfer session so neither keeps the
/// engine alive.
#[derive(Clone)]
pub(crate) struct CommandSender {
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl CommandSender {
    pub fn new(tx: &mpsc::UnboundedSender<Command>) -> Self {
        Self { tx: tx.downgrade() }
    }

    /// Queue a command. Returns `false` once the engine is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx
            .upgrade()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    /// Queue a command and wait for its reply.
    pub async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        if !self.send(command(reply)) {
            return Err(EngineError::Stopped);
        }
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// A transfer event sink that posts into this queue.
    pub fn sink(&self) -> Arc<dyn TransferEventSink> {
        Arc::new(CommandSink {
            commands: self.clone(),
        })
    }
}

/// Routes transfer events through the coordinator's queue.
struct CommandSink {
    commands: CommandSender,
}

impl TransferEventSink for CommandSink {
    fn emit(&self, event: TransferEvent) {
        if !self.commands.send(Command::Transfer(event)) {
            tracing::trace!("Transfer event dropped; engine stopped");
        }
    }
}
