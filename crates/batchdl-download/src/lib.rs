//! Batch download engine.
//!
//! Fetches groups of remote files ("batches"), persists enough state to
//! survive restarts, caps simultaneous transfers, and reports weighted
//! progress per download and per batch.
//!
//! # Architecture
//!
//! - **Engine**: public facade; every call is a message to the coordinator
//! - **Coordinator**: single task owning all bookkeeping, the persistence
//!   store, and the progress tree
//! - **Session**: performs byte transfer concurrently and reports back
//!   through the coordinator's queue
//! - **Handles**: caller-facing views with progress observables

#![deny(unsafe_code)]

mod coordinator;
mod engine;
mod handle;
pub mod progress;
pub mod queue;
pub mod session;

pub use coordinator::DrainHandler;
pub use engine::{DownloadEngine, DownloadEngineDeps};
pub use handle::{BatchHandle, DownloadHandle};
pub use progress::{ProgressEvent, ProgressObservable, ProgressSnapshot, ProgressSubscription};
pub use session::{HttpSessionBuilder, HttpTransferSession, ResumeToken, SessionError};
