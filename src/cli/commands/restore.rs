//! Replace an environment's database with one of its backups.

use crate::cli::commands::{print_json, require_confirmation, Workspace};
use crate::error::{Error, Result};
use crate::host::SystemRunner;
use crate::model::{join_path, Environment};
use crate::site::open_site;
use crate::sync::{fresh_backup, SyncError};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Serialize)]
struct RestoreOutput<'a> {
    environment: &'a str,
    backup: &'a str,
    /// Backup of the database as it was before the restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<&'a str>,
    dry_run: bool,
}

/// Resolve a backup argument: absolute paths are used as given, anything
/// else names a file in the environment's backup directory.
#[must_use]
pub fn resolve_backup_path(env: &Environment, backup: &str) -> String {
    if backup.starts_with('/') {
        backup.to_string()
    } else {
        join_path(&env.backup_dir(), backup)
    }
}

/// Execute the restore command.
///
/// # Errors
///
/// Returns `BackupNotFound` if the file does not exist on the environment,
/// `ProtectedEnvironment` without `--yes`, or the error of the backup taken
/// before the import or of the import itself.
pub fn execute(
    env_name: &str,
    backup: &str,
    yes: bool,
    config_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let env = workspace.config.environment(env_name)?;
    require_confirmation(env, yes)?;

    let runner = SystemRunner;
    let site = open_site(env, &runner, workspace.connect_timeout())?;
    let path = resolve_backup_path(env, backup);

    site.host().probe()?;
    if !site.host().file_exists(&path)? {
        return Err(Error::BackupNotFound {
            environment: env.name.clone(),
            path,
        });
    }

    let dry_run = crate::is_dry_run();
    let mut previous = None;
    if !dry_run {
        let current = fresh_backup(site.as_ref(), Utc::now())?;
        site.host().ensure_dir(&env.backup_dir())?;
        site.export(&current.path)?;
        if !site.host().file_exists(&current.path)? {
            return Err(SyncError::Verification(format!(
                "backup {} was not written on {}",
                current.path, env.name
            ))
            .into());
        }
        info!(env = %env.name, path = %current.path, "Current database backed up");

        site.import(&path)?;
        info!(env = %env.name, path = %path, "Backup restored");
        previous = Some(current.path);
    }

    if json {
        return print_json(&RestoreOutput {
            environment: &env.name,
            backup: &path,
            previous: previous.as_deref(),
            dry_run,
        });
    }

    if dry_run {
        println!("Would restore {} into {}", path.bold(), env.name);
    } else {
        println!("{} {} into {}", "Restored".green(), path.bold(), env.name);
        if let Some(previous) = &previous {
            println!("  Previous database saved to {}", previous.dimmed());
        }
    }
    Ok(())
}
