//! Take a stand-alone backup of an environment's database.

use crate::cli::commands::{print_json, Workspace};
use crate::error::Result;
use crate::host::SystemRunner;
use crate::model::Snapshot;
use crate::site::open_site;
use crate::sync::{fresh_backup, SyncError};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Serialize)]
struct ExportOutput {
    #[serde(flatten)]
    snapshot: Snapshot,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
}

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the environment is unknown or unreachable, or the
/// export does not produce a file.
pub fn execute(env_name: &str, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let env = workspace.config.environment(env_name)?;
    let runner = SystemRunner;
    let site = open_site(env, &runner, workspace.connect_timeout())?;

    let dry_run = crate::is_dry_run();
    site.probe()?;
    let snapshot = fresh_backup(site.as_ref(), Utc::now())?;

    let mut size_bytes = None;
    if !dry_run {
        site.host().ensure_dir(&env.backup_dir())?;
        site.export(&snapshot.path)?;
        size_bytes = site.host().file_size(&snapshot.path)?;
        if size_bytes.is_none() {
            return Err(SyncError::FileNotFound(snapshot.path).into());
        }
        info!(env = %env.name, path = %snapshot.path, "Backup written");
    }

    if json {
        return print_json(&ExportOutput {
            snapshot,
            dry_run,
            size_bytes,
        });
    }

    if dry_run {
        println!("Would write {}", snapshot.path.bold());
    } else {
        println!("{} {}", "Backed up to".green(), snapshot.path.bold());
        if let Some(size) = size_bytes {
            println!("  {size} bytes on {}", env.name);
        }
    }
    Ok(())
}
