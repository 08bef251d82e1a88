//! Command handlers.
//!
//! Each handler takes the [`CliContext`](crate::CliContext), does its work
//! through the engine or the store, and formats output for the terminal.

pub mod cancel;
pub mod fetch;
pub mod list;
