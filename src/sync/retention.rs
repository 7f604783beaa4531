//! Destination backups: listing and pruning.
//!
//! Backups are recognised by name (`<env>-backup-<stamp>.sql`) inside the
//! environment's `backups/` directory. Anything else there is left alone.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::model::{join_path, parse_backup_name, Snapshot, SnapshotKind};
use crate::site::Site;
use crate::sync::types::{SyncError, SyncResult};

/// A backup file with its size when known.
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Backups of a site, newest first.
///
/// # Errors
///
/// Returns an error if the backup directory cannot be listed.
pub fn list_backups(site: &dyn Site) -> SyncResult<Vec<Snapshot>> {
    let env = site.environment();
    let dir = env.backup_dir();
    let mut backups: Vec<Snapshot> = site
        .host()
        .list_dir(&dir)?
        .into_iter()
        .filter_map(|name| {
            parse_backup_name(&env.name, &name).map(|created_at| Snapshot {
                environment: env.name.clone(),
                host_environment: env.name.clone(),
                kind: SnapshotKind::Backup,
                created_at,
                path: join_path(&dir, &name),
            })
        })
        .collect();
    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(backups)
}

/// Stamps tried past an existing file before giving up.
const MAX_NAME_ATTEMPTS: i64 = 1000;

/// A backup of the site stamped at `at` whose file does not exist yet.
///
/// The stamp moves forward one millisecond at a time past existing files,
/// so a new backup never replaces an earlier one.
///
/// # Errors
///
/// Returns an error if the host cannot be queried, or `Verification` when
/// no free name is found.
pub fn fresh_backup(site: &dyn Site, at: DateTime<Utc>) -> SyncResult<Snapshot> {
    let env = site.environment();
    for offset in 0..MAX_NAME_ATTEMPTS {
        let snapshot = Snapshot::backup(env, at + Duration::milliseconds(offset));
        if !site.host().file_exists(&snapshot.path)? {
            return Ok(snapshot);
        }
        debug!(path = %snapshot.path, "Backup name taken");
    }
    Err(SyncError::Verification(format!(
        "no free backup name in {} near {}",
        env.backup_dir(),
        at.to_rfc3339()
    )))
}

/// Backups with sizes, newest first.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn describe_backups(site: &dyn Site) -> SyncResult<Vec<BackupEntry>> {
    list_backups(site)?
        .into_iter()
        .map(|snapshot| {
            let size_bytes = site.host().file_size(&snapshot.path)?;
            Ok(BackupEntry {
                snapshot,
                size_bytes,
            })
        })
        .collect()
}

/// Backups that pruning to `keep` would remove, oldest last.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn prune_candidates(site: &dyn Site, keep: usize) -> SyncResult<Vec<Snapshot>> {
    Ok(list_backups(site)?.into_iter().skip(keep).collect())
}

/// Remove all but the `keep` newest backups. Returns the removed ones.
///
/// # Errors
///
/// Returns an error if a backup cannot be removed; earlier removals stay.
pub fn prune_backups(site: &dyn Site, keep: usize) -> SyncResult<Vec<Snapshot>> {
    let removed = prune_candidates(site, keep)?;
    for backup in &removed {
        site.host().remove_file(&backup.path)?;
        info!(env = %backup.environment, path = %backup.path, "Removed old backup");
    }
    Ok(removed)
}
