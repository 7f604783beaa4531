//! Atomic file operations.
//!
//! This module provides safe file operations that prevent data corruption:
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - JSONL appending with fsync for durability

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::sync::types::{SyncError, SyncResult};

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> SyncResult<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        // Sync to disk before rename
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Append one record to a JSONL file.
///
/// The record is serialized as a single JSON line. The file is synced after
/// the append for durability.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> SyncResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    file.sync_all()?;

    Ok(())
}

/// Read all records from a JSONL file.
///
/// Blank lines are skipped. Invalid lines cause an error with the line
/// number for debugging.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist
/// - Any line cannot be parsed as a `T`
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> SyncResult<Vec<T>> {
    if !path.exists() {
        return Err(SyncError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(&line).map_err(|e| SyncError::InvalidRecord {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Generate .gitignore content for the `.wpsync` directory.
///
/// Uses a whitelist pattern: ignore everything by default, then explicitly
/// include only the configuration file. The run journal stays local.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# wpsync state directory
# Whitelist pattern: ignore everything except the configuration

# Ignore everything by default
*

# Allow .gitignore itself
!.gitignore

# Allow the environment configuration
!config.json
"
}

/// Rules keeping database dumps and uploaded media out of the site repository.
pub const PROJECT_IGNORE_RULES: [&str; 2] = ["*.sql", "wp-content/uploads/"];

/// Ensure .gitignore exists in the state directory.
///
/// If the file already exists, it is not modified (user may have customized it).
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn ensure_gitignore(state_dir: &Path) -> SyncResult<()> {
    let gitignore_path = state_dir.join(".gitignore");

    if gitignore_path.exists() {
        return Ok(());
    }

    fs::create_dir_all(state_dir)?;

    let mut file = File::create(&gitignore_path)?;
    file.write_all(gitignore_content().as_bytes())?;
    file.sync_all()?;

    Ok(())
}

/// Append the missing [`PROJECT_IGNORE_RULES`] to a project `.gitignore`.
///
/// Returns the rules that were added.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn ensure_project_ignore_rules(gitignore_path: &Path) -> SyncResult<Vec<&'static str>> {
    let existing = if gitignore_path.exists() {
        fs::read_to_string(gitignore_path)?
    } else {
        String::new()
    };

    let missing: Vec<&'static str> = PROJECT_IGNORE_RULES
        .into_iter()
        .filter(|rule| !existing.lines().any(|line| line.trim() == *rule))
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str("# Database dumps and uploads are not versioned\n");
    for rule in &missing {
        content.push_str(rule);
        content.push('\n');
    }
    atomic_write(gitignore_path, content.as_bytes())?;

    Ok(missing)
}
