//! Error types for wpsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=config, 3=not_found, 4=validation, 5=remote, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::{FailureKind, SyncError};

/// Result type alias for wpsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the exit code, tooling on the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (exit 2)
    ConfigNotFound,
    AlreadyInitialized,
    ConfigError,

    // Not Found (exit 3)
    EnvironmentNotFound,
    RouteNotFound,
    BackupNotFound,

    // Validation (exit 4)
    InvalidArgument,
    ProtectedEnvironment,

    // Remote (exit 5)
    HostUnreachable,
    CommandFailed,

    // Sync run (exit 6)
    SyncError,

    // Database (exit 7)
    DatabaseError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1): the run reached an impossible stage transition
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::EnvironmentNotFound => "ENVIRONMENT_NOT_FOUND",
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::BackupNotFound => "BACKUP_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ProtectedEnvironment => "PROTECTED_ENVIRONMENT",
            Self::HostUnreachable => "HOST_UNREACHABLE",
            Self::CommandFailed => "COMMAND_FAILED",
            Self::SyncError => "SYNC_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::ConfigNotFound | Self::AlreadyInitialized | Self::ConfigError => 2,
            Self::EnvironmentNotFound | Self::RouteNotFound | Self::BackupNotFound => 3,
            Self::InvalidArgument | Self::ProtectedEnvironment => 4,
            Self::HostUnreachable | Self::CommandFailed => 5,
            Self::SyncError => 6,
            Self::DatabaseError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running the same command can reasonably succeed.
    ///
    /// True for input mistakes and unreachable hosts (network blips).
    /// Nothing is ever retried automatically.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::ProtectedEnvironment | Self::HostUnreachable
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in wpsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No configuration found: run `wpsync init` first")]
    ConfigNotFound,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Environment not found: {name}")]
    EnvironmentNotFound {
        name: String,
        /// Names of configured environments for hint display.
        available: Vec<String>,
    },

    #[error("Route not found: {name}")]
    RouteNotFound {
        name: String,
        /// Names of configured routes for hint display.
        available: Vec<String>,
    },

    #[error("Backup not found on {environment}: {path}")]
    BackupNotFound { environment: String, path: String },

    #[error("Refusing to overwrite protected environment '{name}' without --yes")]
    ProtectedEnvironment { name: String },

    #[error("Sync failed during {stage}: {message}")]
    RunFailed {
        stage: String,
        message: String,
        kind: FailureKind,
        /// (environment, path) of the destination backup taken before the failure.
        backup: Option<(String, String)>,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ConfigNotFound => ErrorCode::ConfigNotFound,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::EnvironmentNotFound { .. } => ErrorCode::EnvironmentNotFound,
            Self::RouteNotFound { .. } => ErrorCode::RouteNotFound,
            Self::BackupNotFound { .. } => ErrorCode::BackupNotFound,
            Self::ProtectedEnvironment { .. } => ErrorCode::ProtectedEnvironment,
            Self::RunFailed { kind, .. } => kind_code(*kind),
            Self::Sync(e) => kind_code(e.kind()),
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ConfigNotFound => Some(
                "Run `wpsync init` in the project root, or pass --config <path>".to_string(),
            ),

            Self::AlreadyInitialized { path } => Some(format!(
                "Configuration already exists at {}. Use `--force` to overwrite it.",
                path.display()
            )),

            Self::EnvironmentNotFound { available, .. } => {
                if available.is_empty() {
                    Some("No environments are configured. Edit .wpsync/config.json.".to_string())
                } else {
                    Some(format!("Known environments: {}", available.join(", ")))
                }
            }

            Self::RouteNotFound { available, .. } => {
                if available.is_empty() {
                    Some("No routes are configured. Use `wpsync routes` to check.".to_string())
                } else {
                    Some(format!("Known routes: {}", available.join(", ")))
                }
            }

            Self::BackupNotFound { environment, .. } => Some(format!(
                "Use `wpsync backups list {environment}` to see available backups."
            )),

            Self::ProtectedEnvironment { .. } => Some(
                "Preview with --dry-run first, then pass --yes to confirm.".to_string(),
            ),

            // Earlier stages leave the destination database untouched.
            Self::RunFailed { stage, backup, .. }
                if stage == "importing" || stage == "rewriting_urls" =>
            {
                backup.as_ref().map(|(env, path)| {
                    format!(
                        "The pre-import backup was kept. Restore it with:\n    \
                         wpsync restore {env} {path} --yes"
                    )
                })
            }
            Self::RunFailed { .. } => None,

            Self::Sync(e) => match e.kind() {
                FailureKind::Unreachable => Some(
                    "Check the ssh host, user and key in the environment's `access` block."
                        .to_string(),
                ),
                FailureKind::Unsupported => {
                    Some("The sqlite engine only works with local access.".to_string())
                }
                _ => None,
            },

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

const fn kind_code(kind: FailureKind) -> ErrorCode {
    match kind {
        FailureKind::Unreachable => ErrorCode::HostUnreachable,
        FailureKind::CommandFailed => ErrorCode::CommandFailed,
        FailureKind::Database => ErrorCode::DatabaseError,
        FailureKind::Io => ErrorCode::IoError,
        FailureKind::Unsupported | FailureKind::Preflight => ErrorCode::InvalidArgument,
        FailureKind::Verification => ErrorCode::SyncError,
        FailureKind::Internal => ErrorCode::InternalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::ConfigNotFound.exit_code(), 2);
        assert_eq!(
            Error::RouteNotFound {
                name: "x".into(),
                available: vec![]
            }
            .exit_code(),
            3
        );
        assert_eq!(
            Error::ProtectedEnvironment {
                name: "production".into()
            }
            .exit_code(),
            4
        );
        let unreachable = SyncError::Unreachable {
            target: "deploy@staging.example.com".into(),
            message: "timeout".into(),
        };
        assert_eq!(Error::Sync(unreachable).exit_code(), 5);
    }

    #[test]
    fn test_run_failed_hint_names_backup() {
        let err = Error::RunFailed {
            stage: "importing".into(),
            message: "boom".into(),
            kind: FailureKind::CommandFailed,
            backup: Some(("staging".into(), "/srv/wpsync/backups/staging-backup-1.sql".into())),
        };
        let hint = err.hint().unwrap();
        assert!(hint.contains("wpsync restore staging /srv/wpsync/backups/staging-backup-1.sql"));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_no_restore_hint_before_import() {
        for stage in ["backing_up_dest", "exporting_source", "transferring"] {
            let err = Error::RunFailed {
                stage: stage.into(),
                message: "scp: lost connection".into(),
                kind: FailureKind::CommandFailed,
                backup: Some(("staging".into(), "/srv/wpsync/backups/staging-backup-1.sql".into())),
            };
            assert_eq!(err.hint(), None, "{stage}");
        }

        let rewriting = Error::RunFailed {
            stage: "rewriting_urls".into(),
            message: "residual".into(),
            kind: FailureKind::Verification,
            backup: Some(("staging".into(), "/srv/wpsync/backups/staging-backup-1.sql".into())),
        };
        assert!(rewriting.hint().unwrap().contains("wpsync restore staging"));
    }

    #[test]
    fn test_internal_failures_exit_one() {
        let err = Error::Sync(SyncError::InvalidTransition {
            from: crate::sync::Stage::Idle,
            to: crate::sync::Stage::Importing,
        });
        assert_eq!(err.error_code(), ErrorCode::InternalError);
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_structured_json()["error"]["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn test_structured_json() {
        let err = Error::EnvironmentNotFound {
            name: "qa".into(),
            available: vec!["local".into(), "staging".into()],
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "ENVIRONMENT_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert_eq!(json["error"]["hint"], "Known environments: local, staging");
    }
}
