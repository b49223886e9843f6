//! `mandi-prices` library crate.
//!
//! The binary (`mandi`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the ingestion pipeline can be driven from the CLI, a scheduler, or the TUI
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod logging;
pub mod query;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod tui;
