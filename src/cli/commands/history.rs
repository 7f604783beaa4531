//! Show the run journal.

use crate::cli::commands::sync::outcome_label;
use crate::cli::commands::{print_json, Workspace};
use crate::error::Result;
use crate::sync::read_runs;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the history command.
///
/// # Errors
///
/// Returns an error if the configuration or the journal cannot be read.
pub fn execute(limit: usize, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let runs = read_runs(workspace.state_dir(), Some(limit))?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in &runs {
        println!(
            "{}  {}  {:<24} {}  {}",
            run.id.dimmed(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.route,
            outcome_label(&run.outcome),
            format!("{} ms", run.duration_ms()).dimmed()
        );
        if let Some(backup) = &run.backup {
            println!("    backup: {}", backup.path);
        }
    }
    Ok(())
}
