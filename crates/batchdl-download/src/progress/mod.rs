//! Progress aggregation and observation.
//!
//! The [`ProgressTree`] arena owns the numbers; each tracked node has a
//! [`ProgressObservable`] that callers subscribe to.

mod observable;
mod tree;

pub use observable::{ProgressEvent, ProgressObservable, ProgressSubscription};
pub use tree::{NodeId, ProgressSnapshot, ProgressTree, TreeError};
