//! Command implementations.

pub mod backups;
pub mod completions;
pub mod env;
pub mod export;
pub mod history;
pub mod init;
pub mod restore;
pub mod rewrite;
pub mod routes;
pub mod sync;
pub mod version;

use std::path::{Path, PathBuf};

use crate::config::{load_config, state_dir_for, SyncConfig};
use crate::error::{Error, Result};
use crate::model::Environment;

/// A loaded configuration with the directory it lives in.
pub struct Workspace {
    pub config: SyncConfig,
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
}

impl Workspace {
    /// Resolve and load the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` or `Config` errors.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let (config, config_path) = load_config(config_path.map(PathBuf::as_path))?;
        let state_dir = state_dir_for(&config_path);
        Ok(Self {
            config,
            config_path,
            state_dir,
        })
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn connect_timeout(&self) -> u64 {
        self.config.options.connect_timeout
    }
}

/// Refuse destructive work on a protected environment without `--yes`.
///
/// Dry runs never need confirmation.
///
/// # Errors
///
/// Returns `ProtectedEnvironment`.
pub fn require_confirmation(env: &Environment, yes: bool) -> Result<()> {
    if env.protected && !yes && !crate::is_dry_run() {
        return Err(Error::ProtectedEnvironment {
            name: env.name.clone(),
        });
    }
    Ok(())
}

/// Print a value as one line of JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
