//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default cap on simultaneous transfers.
pub const DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS: usize = 3;

/// Configuration for the download engine and its HTTP transfer session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of transfers running at once (at least 1).
    pub max_simultaneous_downloads: usize,
    /// Directory for in-flight transfer bodies.
    pub temp_directory: PathBuf,
    /// Per-request timeout enforced by the transport.
    pub request_timeout: Option<Duration>,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Minimum spacing between progress events from one transfer.
    pub progress_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_downloads: DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS,
            temp_directory: std::env::temp_dir().join("batchdl"),
            request_timeout: None,
            connect_timeout: Duration::from_secs(30),
            user_agent: concat!("batchdl/", env!("CARGO_PKG_VERSION")).to_string(),
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given concurrency cap.
    pub fn with_max_simultaneous(max_simultaneous_downloads: usize) -> Self {
        Self {
            max_simultaneous_downloads: max_simultaneous_downloads.max(1),
            ..Default::default()
        }
    }

    /// Set the directory for in-flight transfer bodies.
    #[must_use]
    pub fn with_temp_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_directory = dir.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the minimum spacing between progress events.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// The concurrency cap, never below 1.
    pub fn max_simultaneous(&self) -> usize {
        self.max_simultaneous_downloads.max(1)
    }
}
