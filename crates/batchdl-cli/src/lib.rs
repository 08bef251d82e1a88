//! Command-line front end for the batchdl download engine.
//!
//! `main.rs` parses arguments and hands a [`CliContext`] to the handlers;
//! nothing outside [`bootstrap`] opens the store or starts the engine.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::Commands;
pub use error::CliError;
pub use parser::{Cli, parse_download};
