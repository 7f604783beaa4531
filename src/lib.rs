//! wpsync - WordPress database sync between local, staging and production
//!
//! This crate provides the core functionality for the `wpsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Environment, Route, UrlMapping, Snapshot)
//! - [`host`] - Local and ssh command execution
//! - [`site`] - Database engines (WP-CLI, SQLite)
//! - [`rewrite`] - Serialization-aware URL replacement
//! - [`sync`] - The sync pipeline, transfer, journal and backup retention
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod rewrite;
pub mod site;
pub mod sync;

pub use error::{Error, Result};

/// Global dry-run flag for `--dry-run`.
///
/// When set, commands run their checks and report what would happen
/// without writing. Avoids threading a `dry_run` bool through every
/// handler signature.
pub static DRY_RUN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if dry-run mode is active.
#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(std::sync::atomic::Ordering::Relaxed)
}
