//! Run journal: one [`RunReport`] per line in `runs.jsonl`.

use std::path::{Path, PathBuf};

use crate::sync::file::{append_jsonl, read_jsonl};
use crate::sync::types::{RunReport, SyncResult};

/// Journal file name inside the state directory.
pub const JOURNAL_FILE: &str = "runs.jsonl";

#[must_use]
pub fn journal_path(state_dir: &Path) -> PathBuf {
    state_dir.join(JOURNAL_FILE)
}

/// Append a finished run.
///
/// # Errors
///
/// Returns an error if the journal cannot be written.
pub fn append_run(state_dir: &Path, report: &RunReport) -> SyncResult<()> {
    append_jsonl(&journal_path(state_dir), report)
}

/// Read runs, newest first. A missing journal is empty.
///
/// # Errors
///
/// Returns an error if a line cannot be parsed.
pub fn read_runs(state_dir: &Path, limit: Option<usize>) -> SyncResult<Vec<RunReport>> {
    let path = journal_path(state_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut runs: Vec<RunReport> = read_jsonl(&path)?;
    runs.reverse();
    if let Some(limit) = limit {
        runs.truncate(limit);
    }
    Ok(runs)
}
