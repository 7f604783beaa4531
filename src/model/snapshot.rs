//! Snapshot naming.
//!
//! Snapshot files embed a UTC stamp with millisecond precision so that
//! backups never overwrite each other. Stamps sort lexicographically in time
//! order.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::environment::{join_path, Environment};

/// Timestamp format embedded in snapshot file names.
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Second-precision part of [`STAMP_FORMAT`]; names written before
/// millisecond stamps carry only this.
const SECONDS_FORMAT: &str = "%Y%m%d-%H%M%S";

/// File extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "sql";

/// Role of a snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Export of the source, written on the source host.
    Export,
    /// Transferred copy of the export, written on the destination host.
    Incoming,
    /// Backup of the destination taken before import.
    Backup,
}

/// A snapshot file on one environment's filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Environment whose state the snapshot holds.
    pub environment: String,
    /// Environment whose filesystem the file lives on.
    pub host_environment: String,
    pub kind: SnapshotKind,
    pub created_at: DateTime<Utc>,
    pub path: String,
}

impl Snapshot {
    /// Export of `source` into its snapshot directory.
    #[must_use]
    pub fn export(source: &Environment, created_at: DateTime<Utc>) -> Self {
        let name = format!("{}-{}.{SNAPSHOT_EXTENSION}", source.name, stamp(created_at));
        Self {
            environment: source.name.clone(),
            host_environment: source.name.clone(),
            kind: SnapshotKind::Export,
            created_at,
            path: join_path(&source.snapshot_dir(), &name),
        }
    }

    /// Copy of a `source` export inside the destination's snapshot directory.
    #[must_use]
    pub fn incoming(source: &Environment, dest: &Environment, created_at: DateTime<Utc>) -> Self {
        let name = format!(
            "incoming-{}-{}.{SNAPSHOT_EXTENSION}",
            source.name,
            stamp(created_at)
        );
        Self {
            environment: source.name.clone(),
            host_environment: dest.name.clone(),
            kind: SnapshotKind::Incoming,
            created_at,
            path: join_path(&dest.snapshot_dir(), &name),
        }
    }

    /// Backup of `env` inside its backup directory.
    #[must_use]
    pub fn backup(env: &Environment, created_at: DateTime<Utc>) -> Self {
        Self {
            environment: env.name.clone(),
            host_environment: env.name.clone(),
            kind: SnapshotKind::Backup,
            created_at,
            path: join_path(&env.backup_dir(), &backup_file_name(&env.name, created_at)),
        }
    }

    /// File name component of the path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Format a timestamp for file names.
#[must_use]
pub fn stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Backup file name for an environment at a time.
#[must_use]
pub fn backup_file_name(env: &str, at: DateTime<Utc>) -> String {
    format!("{env}-backup-{}.{SNAPSHOT_EXTENSION}", stamp(at))
}

/// Parse a backup file name produced by [`backup_file_name`] for `env`.
///
/// Returns `None` for files that are not backups of `env`.
#[must_use]
pub fn parse_backup_name(env: &str, file_name: &str) -> Option<DateTime<Utc>> {
    let rest = file_name.strip_prefix(env)?.strip_prefix("-backup-")?;
    let stamp = rest.strip_suffix(SNAPSHOT_EXTENSION)?.strip_suffix('.')?;
    parse_stamp(stamp)
}

/// Parse a stamp produced by [`stamp`], or its second-precision form.
#[must_use]
pub fn parse_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    let seconds = stamp.get(..15)?;
    let millis = match stamp.get(15..)? {
        "" => 0,
        rest => {
            let digits = rest.strip_prefix('-')?;
            if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<i64>().ok()?
        }
    };
    let naive = NaiveDateTime::parse_from_str(seconds, SECONDS_FORMAT).ok()?;
    Some(naive.and_utc() + Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::environment::{Access, DatabaseEngine};
    use chrono::TimeZone;

    fn env(name: &str, root: &str) -> Environment {
        Environment {
            name: name.into(),
            base_url: format!("http://{name}.test"),
            root_path: root.into(),
            access: Access::Local,
            database: DatabaseEngine::default(),
            work_dir: None,
            protected: false,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap() + Duration::milliseconds(42)
    }

    #[test]
    fn test_snapshot_paths() {
        let local = env("local", "/home/me/site");
        let staging = env("staging", "/var/www/staging");

        assert_eq!(
            Snapshot::export(&local, at()).path,
            "/home/me/wpsync/snapshots/local-20260314-150926-042.sql"
        );
        assert_eq!(
            Snapshot::incoming(&local, &staging, at()).path,
            "/var/www/wpsync/snapshots/incoming-local-20260314-150926-042.sql"
        );
        let backup = Snapshot::backup(&staging, at());
        assert_eq!(backup.path, "/var/www/wpsync/backups/staging-backup-20260314-150926-042.sql");
        assert_eq!(backup.file_name(), "staging-backup-20260314-150926-042.sql");
    }

    #[test]
    fn test_parse_backup_name() {
        let name = backup_file_name("production", at());
        assert_eq!(parse_backup_name("production", &name), Some(at()));
        assert_eq!(parse_backup_name("staging", &name), None);
        assert_eq!(parse_backup_name("production", "production-backup-x.sql"), None);
        assert_eq!(parse_backup_name("production", "notes.txt"), None);
        assert_eq!(
            parse_backup_name("production", "production-backup-20260314-150926-42.sql"),
            None
        );
    }

    #[test]
    fn test_second_precision_names_still_parse() {
        let whole_second = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            parse_backup_name("production", "production-backup-20260314-150926.sql"),
            Some(whole_second)
        );
    }

    #[test]
    fn test_stamps_within_one_second_differ() {
        let a = at();
        let b = a + Duration::milliseconds(1);
        assert_ne!(backup_file_name("staging", a), backup_file_name("staging", b));
        assert!(stamp(a) < stamp(b));
        assert_eq!(parse_stamp(&stamp(b)), Some(b));
    }
}
