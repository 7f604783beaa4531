//! Backup listing and pruning.

use crate::cli::BackupsCommands;
use crate::cli::commands::{print_json, Workspace};
use crate::error::{Error, Result};
use crate::host::SystemRunner;
use crate::site::open_site;
use crate::sync::retention::prune_candidates;
use crate::sync::{describe_backups, prune_backups};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct PruneOutput<'a> {
    environment: &'a str,
    keep: usize,
    removed: Vec<String>,
    dry_run: bool,
}

/// Execute backup commands.
///
/// # Errors
///
/// Returns an error if the environment is unknown or its backup directory
/// cannot be listed.
pub fn execute(command: &BackupsCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let runner = SystemRunner;

    match command {
        BackupsCommands::List { env } => {
            let env = workspace.config.environment(env)?;
            let site = open_site(env, &runner, workspace.connect_timeout())?;
            let backups = describe_backups(site.as_ref())?;

            if json {
                return print_json(&backups);
            }
            if backups.is_empty() {
                println!("No backups in {}", env.backup_dir().dimmed());
                return Ok(());
            }
            for entry in &backups {
                let size = entry
                    .size_bytes
                    .map_or_else(|| "?".to_string(), |s| s.to_string());
                println!(
                    "{}  {:>12} bytes  {}",
                    entry.snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                    size,
                    entry.snapshot.file_name().dimmed()
                );
            }
            Ok(())
        }
        BackupsCommands::Prune { env, keep } => {
            if *keep == 0 {
                return Err(Error::InvalidArgument(
                    "--keep must be at least 1".to_string(),
                ));
            }
            let env = workspace.config.environment(env)?;
            let site = open_site(env, &runner, workspace.connect_timeout())?;

            let dry_run = crate::is_dry_run();
            let removed = if dry_run {
                prune_candidates(site.as_ref(), *keep)?
            } else {
                prune_backups(site.as_ref(), *keep)?
            };

            if json {
                return print_json(&PruneOutput {
                    environment: &env.name,
                    keep: *keep,
                    removed: removed.into_iter().map(|s| s.path).collect(),
                    dry_run,
                });
            }

            let verb = if dry_run { "Would remove" } else { "Removed" };
            println!("{verb} {} backup(s) of {}", removed.len(), env.name);
            for snapshot in &removed {
                println!("  {}", snapshot.file_name().dimmed());
            }
            Ok(())
        }
    }
}
