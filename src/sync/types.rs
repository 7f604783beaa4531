//! Sync types: run reports and sync-specific errors.
//!
//! A [`RunReport`] is the record of one synchronization run. Reports are
//! printed at the end of a run and appended to the run journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Snapshot, UrlMapping};
use crate::sync::stage::Stage;

/// Final (or current) state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The run has not reached a terminal stage yet.
    Running,
    /// Every stage succeeded.
    Completed,
    /// Preflight only; nothing was written.
    DryRun,
    /// A stage failed; later stages never ran.
    Failed {
        stage: Stage,
        kind: FailureKind,
        message: String,
    },
}

/// One executed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Counts for one URL mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRecord {
    pub mapping: UrlMapping,
    /// Occurrences of `mapping.from` found in the source at preflight.
    pub expected: u64,
    /// Occurrences replaced at the destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced: Option<u64>,
    /// Occurrences of `mapping.from` left at the destination after the rewrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residual: Option<u64>,
}

/// Record of one synchronization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id: `run_` plus the first 12 characters of a v4 UUID.
    pub id: String,
    pub route: String,
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub outcome: Outcome,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
    /// Destination backup taken before import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<Snapshot>,
    /// Snapshot files left on disk (failed runs, `--keep-snapshots`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retained: Vec<Snapshot>,
    #[serde(default)]
    pub rewrites: Vec<RewriteRecord>,
}

impl RunReport {
    /// Whether the run finished every stage.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed | Outcome::DryRun)
    }

    /// Stages that were entered, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.steps.iter().map(|s| s.stage).collect()
    }

    /// Total run time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum()
    }
}

/// Coarse failure category, stored in reports and mapped to exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    CommandFailed,
    Verification,
    Preflight,
    Unsupported,
    Database,
    Io,
    Internal,
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Remote host could not be reached (ssh exit status 255).
    #[error("Host {target} is unreachable: {message}")]
    Unreachable { target: String, message: String },

    /// An external command exited non-zero.
    #[error("Command `{command}` failed ({status}): {message}")]
    CommandFailed {
        command: String,
        status: String,
        message: String,
    },

    /// An external command could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Transferred snapshot differs from the exported one.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A post-step check did not hold (missing backup, count mismatch, truncated dump).
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The run was refused before anything was written.
    #[error("Preflight check failed: {0}")]
    Preflight(String),

    /// The environment's configuration combines features that cannot work together.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Snapshot or database file missing.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Orchestrator attempted an illegal stage transition.
    #[error("Invalid stage transition: {from} → {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid journal line.
    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord {
        /// Line number (1-indexed).
        line: usize,
        /// Error message.
        message: String,
    },
}

impl SyncError {
    /// Failure category of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } => FailureKind::Unreachable,
            Self::CommandFailed { .. } | Self::Spawn { .. } => FailureKind::CommandFailed,
            Self::ChecksumMismatch { .. } | Self::Verification(_) | Self::FileNotFound(_) => {
                FailureKind::Verification
            }
            Self::Preflight(_) => FailureKind::Preflight,
            Self::Unsupported(_) => FailureKind::Unsupported,
            Self::Database(_) => FailureKind::Database,
            Self::Io(_) | Self::Json(_) | Self::InvalidRecord { .. } => FailureKind::Io,
            Self::InvalidTransition { .. } => FailureKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
