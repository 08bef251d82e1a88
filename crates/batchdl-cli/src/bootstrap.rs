//! CLI bootstrap - the composition root.
//!
//! Opens the store and builds the engine. Handlers receive a
//! [`CliContext`] and never touch the pool directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use batchdl_core::{DownloadsPersistencePort, EngineConfig, paths};
use batchdl_db::{DbFactory, setup_database};
use batchdl_download::{DownloadEngine, DownloadEngineDeps};

use crate::parser::Cli;

/// Bootstrap configuration for the CLI.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// SQLite store location.
    pub database_path: PathBuf,
    /// Directory for in-flight transfer bodies.
    pub temp_directory: PathBuf,
    /// Cap on simultaneous transfers.
    pub max_concurrent: usize,
}

impl CliConfig {
    /// Resolve flags (and their environment fallbacks) against the default
    /// locations.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let database_path = match &cli.db {
            Some(path) => path.clone(),
            None => paths::database_path()?,
        };
        let temp_directory = match database_path.parent() {
            Some(dir) if cli.db.is_some() => dir.join("partial"),
            _ => paths::temp_directory()?,
        };

        Ok(Self {
            database_path,
            temp_directory,
            max_concurrent: cli.max_concurrent.max(1),
        })
    }

    /// Engine configuration derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::with_max_simultaneous(self.max_concurrent)
            .with_temp_directory(self.temp_directory.clone())
    }
}

/// Composed infrastructure for command handlers.
pub struct CliContext {
    config: CliConfig,
    persistence: Arc<dyn DownloadsPersistencePort>,
}

impl CliContext {
    /// The resolved configuration.
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// The download store.
    pub fn persistence(&self) -> &Arc<dyn DownloadsPersistencePort> {
        &self.persistence
    }

    /// Start the engine over the store.
    ///
    /// Batches left from earlier runs resume as soon as it starts.
    pub fn start_engine(&self) -> Result<DownloadEngine> {
        let engine = DownloadEngine::start_http(DownloadEngineDeps {
            config: self.config.engine_config(),
            persistence: Arc::clone(&self.persistence),
        })?;
        Ok(engine)
    }
}

/// Open the store and compose the context.
pub async fn bootstrap(config: CliConfig) -> Result<CliContext> {
    let pool = setup_database(&config.database_path).await?;
    tracing::debug!(path = %config.database_path.display(), "Opened download store");

    let persistence: Arc<dyn DownloadsPersistencePort> = DbFactory::downloads_repository(pool);
    Ok(CliContext {
        config,
        persistence,
    })
}
