//! Environment model.
//!
//! An environment is one deployment target of the site (`local`, `staging`,
//! `production`). Environments are read from the configuration file and never
//! created at runtime.

use serde::{Deserialize, Serialize};

/// Default WP-CLI binary name.
pub const DEFAULT_WP_BINARY: &str = "wp";

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment name; filled in from the configuration map key.
    #[serde(default, skip_serializing)]
    pub name: String,
    /// Public base URL, optionally with a port (`http://mysite.local:8080`).
    pub base_url: String,
    /// WordPress installation root on the environment's filesystem.
    pub root_path: String,
    /// How the environment is reached.
    #[serde(default)]
    pub access: Access,
    /// Where the site's database lives and how it is exported.
    #[serde(default)]
    pub database: DatabaseEngine,
    /// Directory for snapshots and backups (default: `<parent of root_path>/wpsync`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Destructive commands targeting this environment need `--yes`.
    #[serde(default)]
    pub protected: bool,
}

/// Reachability method of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Access {
    /// Local filesystem and processes.
    #[default]
    Local,
    /// Remote shell over ssh.
    Ssh {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity_file: Option<String>,
    },
}

/// Database engine of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum DatabaseEngine {
    /// MySQL/MariaDB driven through WP-CLI (`wp db export`, `wp search-replace`).
    WpCli {
        #[serde(default = "default_wp_binary")]
        binary: String,
    },
    /// A SQLite database file handled in-process.
    Sqlite { path: String },
}

fn default_wp_binary() -> String {
    DEFAULT_WP_BINARY.to_string()
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        Self::WpCli {
            binary: default_wp_binary(),
        }
    }
}

impl Environment {
    /// Domain of the environment: host and optional port of `base_url`.
    ///
    /// `https://www.example.com/blog` → `www.example.com`,
    /// `http://mysite.local:8080` → `mysite.local:8080`.
    #[must_use]
    pub fn domain(&self) -> String {
        domain_of(&self.base_url)
    }

    /// Whether the environment is reached over ssh.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self.access, Access::Ssh { .. })
    }

    /// Working directory for snapshots and backups.
    #[must_use]
    pub fn work_dir(&self) -> String {
        if let Some(dir) = self.work_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return dir.trim_end_matches('/').to_string();
        }
        let root = self.root_path.trim_end_matches('/');
        match root.rfind('/') {
            Some(0) | None => "/wpsync".to_string(),
            Some(idx) => format!("{}/wpsync", &root[..idx]),
        }
    }

    /// Directory holding exported and incoming snapshots.
    #[must_use]
    pub fn snapshot_dir(&self) -> String {
        join_path(&self.work_dir(), "snapshots")
    }

    /// Directory holding destination backups.
    #[must_use]
    pub fn backup_dir(&self) -> String {
        join_path(&self.work_dir(), "backups")
    }

    /// Human-readable description of where the environment lives.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.access {
            Access::Local => format!("local:{}", self.root_path),
            Access::Ssh { host, user, .. } => match user {
                Some(user) => format!("{user}@{host}:{}", self.root_path),
                None => format!("{host}:{}", self.root_path),
            },
        }
    }
}

/// Extract `host[:port]` from a URL, ignoring scheme, credentials and path.
#[must_use]
pub fn domain_of(url: &str) -> String {
    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
    authority.to_ascii_lowercase()
}

/// Join a POSIX path with a file name. Remote paths are always POSIX.
#[must_use]
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}
