//! Public entry point of the download engine.

use std::sync::Arc;

use tokio::sync::mpsc;

use batchdl_core::{
    DownloadRequest, DownloadsPersistencePort, EngineConfig, EngineError, TransferEventSink,
    TransferSessionPort,
};

use crate::coordinator::{Command, CommandSender, Coordinator, CoordinatorDeps, DrainHandler};
use crate::handle::BatchHandle;
use crate::session::{HttpSessionBuilder, SessionError};

/// Dependencies for building a [`DownloadEngine`].
pub struct DownloadEngineDeps {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Persistence store, already opened and migrated.
    pub persistence: Arc<dyn DownloadsPersistencePort>,
}

/// Batch download engine.
///
/// Every operation is queued onto the engine's single coordinator task and
/// resolves asynchronously; nothing blocks the caller. Operations issued
/// before startup reconciliation has finished are held until it has.
pub struct DownloadEngine {
    // Keeps the coordinator alive; handles and the session only hold weak
    // senders.
    _tx: mpsc::UnboundedSender<Command>,
    commands: CommandSender,
}

impl DownloadEngine {
    /// Start the engine with a caller-supplied transfer session.
    ///
    /// `session_factory` receives the sink the session must report through.
    /// Must be called from within a Tokio runtime.
    pub fn start<F>(deps: DownloadEngineDeps, session_factory: F) -> Self
    where
        F: FnOnce(Arc<dyn TransferEventSink>) -> Arc<dyn TransferSessionPort>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let commands = CommandSender::new(&tx);
        let session = session_factory(commands.sink());

        let coordinator = Coordinator::new(CoordinatorDeps {
            max_simultaneous: deps.config.max_simultaneous(),
            persistence: deps.persistence,
            session,
            commands: commands.clone(),
        });
        tokio::spawn(coordinator.run(rx, tx.clone()));

        tracing::debug!(
            max_simultaneous = deps.config.max_simultaneous(),
            "Download engine started"
        );

        Self { _tx: tx, commands }
    }

    /// Start the engine with the built-in HTTP transfer session.
    pub fn start_http(deps: DownloadEngineDeps) -> Result<Self, SessionError> {
        let builder = HttpSessionBuilder::new(&deps.config)?;
        Ok(Self::start(deps, |sink| -> Arc<dyn TransferSessionPort> {
            Arc::new(builder.build(sink))
        }))
    }

    /// Persist a batch and start it, up to the concurrency cap.
    pub async fn submit(&self, requests: Vec<DownloadRequest>) -> Result<BatchHandle, EngineError> {
        self.commands
            .request(|reply| Command::Submit { requests, reply })
            .await?
    }

    /// Every batch currently tracked, ordered by id.
    pub async fn get_ongoing(&self) -> Result<Vec<BatchHandle>, EngineError> {
        self.commands
            .request(|reply| Command::GetOngoing { reply })
            .await?
    }

    /// Cancel batches. Handles that already finished are ignored.
    pub async fn cancel(&self, handles: &[BatchHandle]) -> Result<(), EngineError> {
        let batches = handles.iter().map(BatchHandle::id).collect();
        self.commands
            .request(|reply| Command::Cancel { batches, reply })
            .await
    }

    /// Register the callback run once when the transfer session reports
    /// that all queued events have been delivered.
    ///
    /// The slot is cleared after the callback runs; register again for the
    /// next drain.
    pub async fn set_drain_handler<F>(&self, handler: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let handler: DrainHandler = Box::new(handler);
        self.commands
            .request(|reply| Command::SetDrainHandler {
                handler: Some(handler),
                reply,
            })
            .await
    }

    /// Remove a registered drain callback.
    pub async fn clear_drain_handler(&self) -> Result<(), EngineError> {
        self.commands
            .request(|reply| Command::SetDrainHandler {
                handler: None,
                reply,
            })
            .await
    }

    /// Stop the engine.
    ///
    /// Persisted batches are kept and resume on the next start; outstanding
    /// handles resolve with `BatchError::Stopped`.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        self.commands
            .request(|reply| Command::Shutdown { reply })
            .await
    }
}
