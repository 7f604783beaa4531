//! Sites: the database side of an environment.
//!
//! A [`Site`] knows how to export, import and rewrite one environment's
//! database. Two engines exist:
//! - [`WpCliSite`] drives MySQL/MariaDB through WP-CLI, locally or over ssh
//! - [`SqliteSite`] handles a local SQLite database file in-process

pub mod sqlite;
pub mod wpcli;

use crate::host::{CommandRunner, Host};
use crate::model::{DatabaseEngine, Environment, UrlMapping};
use crate::sync::{SyncError, SyncResult};

pub use sqlite::SqliteSite;
pub use wpcli::WpCliSite;

/// Database operations on one environment.
///
/// Exporter, Importer and Rewriter all go through this trait; file
/// housekeeping goes through [`Site::host`].
pub trait Site {
    fn environment(&self) -> &Environment;

    /// Execution context for the environment's files.
    fn host(&self) -> &Host<'_>;

    /// Engine name (`wp-cli`, `sqlite`). Snapshots only move between sites
    /// of the same engine.
    fn engine(&self) -> &'static str;

    /// Check that the environment is reachable and holds a site.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` or `Preflight` when it does not.
    fn probe(&self) -> SyncResult<()>;

    /// Write the complete database state to `path` on the site's host.
    ///
    /// # Errors
    ///
    /// Returns an error if the export command fails.
    fn export(&self, path: &str) -> SyncResult<()>;

    /// Replace the complete database state with the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    fn import(&self, path: &str) -> SyncResult<()>;

    /// Number of occurrences of `mapping.from` a rewrite would replace.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    fn count_occurrences(&self, mapping: &UrlMapping) -> SyncResult<u64>;

    /// Replace `mapping.from` with `mapping.to` everywhere; returns the count.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; nothing is changed then.
    fn search_replace(&self, mapping: &UrlMapping) -> SyncResult<u64>;

    fn name(&self) -> &str {
        &self.environment().name
    }
}

/// Open the site for an environment.
///
/// # Errors
///
/// Returns `Unsupported` for a SQLite database on a remote host.
pub fn open_site<'a>(
    env: &'a Environment,
    runner: &'a dyn CommandRunner,
    connect_timeout: u64,
) -> SyncResult<Box<dyn Site + 'a>> {
    let host = Host::from_access(&env.access, connect_timeout, runner);
    match &env.database {
        DatabaseEngine::WpCli { binary } => Ok(Box::new(WpCliSite::new(env, host, binary))),
        DatabaseEngine::Sqlite { path } => {
            if env.is_remote() {
                return Err(SyncError::Unsupported(format!(
                    "environment '{}' uses the sqlite engine over ssh",
                    env.name
                )));
            }
            Ok(Box::new(SqliteSite::new(env, host, path)))
        }
    }
}
