//! Database synchronization between environments.
//!
//! This module holds the pipeline that moves one environment's database onto
//! another, and the helpers around it:
//!
//! - **Pipeline**: backup → export → transfer → import → rewrite → cleanup
//! - **Stages**: the run state machine with its legal transitions
//! - **Transfer**: byte-for-byte snapshot copies between hosts
//! - **Hashing**: SHA256 checksums of snapshots before and after transfer
//! - **Journal**: JSONL record of every run
//! - **Retention**: listing and pruning of destination backups
//!
//! # Example
//!
//! ```ignore
//! use wpsync::site::open_site;
//! use wpsync::sync::{PipelineOptions, ScpTransport, SyncPipeline, SyncPlan};
//!
//! let source = open_site(&local, &runner, 10)?;
//! let dest = open_site(&staging, &runner, 10)?;
//! let transport = ScpTransport::new(&runner);
//! let plan = SyncPlan::new("local-to-staging", &local, &staging, mappings, Utc::now());
//! let report = SyncPipeline::new(&*source, &*dest, &transport, PipelineOptions::default()).run(&plan);
//! ```

pub mod file;
pub mod hash;
pub mod journal;
pub mod pipeline;
pub mod retention;
pub mod stage;
pub mod transfer;
mod types;

// Re-export main types and functions
pub use file::{append_jsonl, atomic_write, ensure_gitignore, read_jsonl};
pub use journal::{append_run, read_runs};
pub use pipeline::{PipelineOptions, SyncPipeline, SyncPlan};
pub use retention::{describe_backups, fresh_backup, list_backups, prune_backups, BackupEntry};
pub use stage::Stage;
pub use transfer::{ScpTransport, Transport};
pub use types::{
    FailureKind, Outcome, RewriteRecord, RunReport, StepRecord, SyncError, SyncResult,
};
