//! Configuration management.
//!
//! This module provides functions for discovering the wpsync state
//! directory, resolving the configuration path, and loading the
//! environment/route configuration.
//!
//! # Layout
//!
//! Configuration lives in a per-project `.wpsync/` directory, next to the
//! site's code:
//! - **Configuration**: `.wpsync/config.json` (versioned)
//! - **Run journal**: `.wpsync/runs.jsonl` (local only)
//!
//! A global `~/.wpsync/config.json` is used when no project directory is
//! found.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::DEFAULT_CONNECT_TIMEOUT;
use crate::model::{standard_routes, Access, DatabaseEngine, Environment, Route, UrlMapping};
use crate::sync::atomic_write;

/// Name of the state directory.
pub const STATE_DIR_NAME: &str = ".wpsync";

/// Name of the configuration file inside the state directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "WPSYNC_CONFIG";

/// Discover the project-level `.wpsync/` directory.
///
/// Resolution strategy:
/// 1. Check the **git root** first: if the git root has `.wpsync/`, use it.
///    This prevents nested directories from shadowing the real project root.
/// 2. Fall back to walking up from CWD (for non-git projects).
#[must_use]
pub fn discover_project_state_dir() -> Option<PathBuf> {
    // Strategy 1: Use git root as the anchor
    if let Some(git_root) = git_toplevel() {
        let candidate = git_root.join(STATE_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    // Strategy 2: Walk up from CWD (non-git projects)
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        loop {
            let candidate = dir.join(STATE_DIR_NAME);
            if candidate.is_dir() {
                return Some(candidate);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }
    None
}

/// Get the git repository root directory.
#[must_use]
pub fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Get the global state directory (`~/.wpsync/`).
#[must_use]
pub fn global_state_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(STATE_DIR_NAME))
}

/// Resolve the configuration file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `WPSYNC_CONFIG` environment variable
/// 3. Project `.wpsync/config.json` (git root, then walking up)
/// 4. Global `~/.wpsync/config.json`, if it exists
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: WPSYNC_CONFIG environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Project directory
    if let Some(dir) = discover_project_state_dir() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    // Priority 4: Global directory
    global_state_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

/// State directory belonging to a configuration file (its parent).
#[must_use]
pub fn state_dir_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Run switches shared by every route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Compare SHA-256 of the export and the transferred copy.
    pub verify_checksums: bool,
    /// ssh `ConnectTimeout` in seconds.
    pub connect_timeout: u64,
    /// Backups kept per environment after a successful sync (`None` = all).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_backups: Option<usize>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_backups: None,
        }
    }
}

/// The configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub environments: BTreeMap<String, Environment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub options: SyncOptions,
}

impl SyncConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` if the file does not exist, `Config` if it
    /// cannot be parsed or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound);
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        let mut config: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;
        for (name, env) in &mut config.environments {
            env.name.clone_from(name);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.environments.is_empty() {
            return Err("no environments configured".to_string());
        }
        for (name, env) in &self.environments {
            if !is_valid_name(name) {
                return Err(format!(
                    "environment name '{name}' may only contain letters, digits, '-' and '_'"
                ));
            }
            if env.base_url.trim().is_empty() || env.domain().is_empty() {
                return Err(format!("environment '{name}' has no base_url"));
            }
            if !env.root_path.starts_with('/') {
                return Err(format!(
                    "environment '{name}': root_path must be absolute, got '{}'",
                    env.root_path
                ));
            }
            if let Access::Ssh { host, .. } = &env.access {
                if host.trim().is_empty() {
                    return Err(format!("environment '{name}': ssh access needs a host"));
                }
            }
            if let DatabaseEngine::Sqlite { path } = &env.database {
                if path.trim().is_empty() {
                    return Err(format!("environment '{name}': sqlite engine needs a path"));
                }
            }
        }

        let mut seen = Vec::new();
        for route in &self.routes {
            if seen.contains(&route.name.as_str()) {
                return Err(format!("route '{}' is defined twice", route.name));
            }
            seen.push(route.name.as_str());
            for end in [&route.from, &route.to] {
                if !self.environments.contains_key(end) {
                    return Err(format!(
                        "route '{}' refers to unknown environment '{end}'",
                        route.name
                    ));
                }
            }
            if route.from == route.to {
                return Err(format!("route '{}' has the same source and destination", route.name));
            }
            for mapping in &route.mappings {
                mapping
                    .validate()
                    .map_err(|e| format!("route '{}': {e}", route.name))?;
            }
        }

        if self.options.keep_backups == Some(0) {
            return Err("options.keep_backups must be at least 1".to_string());
        }
        Ok(())
    }

    /// Look up an environment by name.
    ///
    /// # Errors
    ///
    /// Returns `EnvironmentNotFound` with the known names.
    pub fn environment(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .ok_or_else(|| Error::EnvironmentNotFound {
                name: name.to_string(),
                available: self.environments.keys().cloned().collect(),
            })
    }

    /// Configured routes, or the standard ones when none are configured.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        if self.routes.is_empty() {
            standard_routes(|name| self.environments.contains_key(name))
        } else {
            self.routes.clone()
        }
    }

    /// Look up a route by name.
    ///
    /// # Errors
    ///
    /// Returns `RouteNotFound` with the known names.
    pub fn route(&self, name: &str) -> Result<Route> {
        let routes = self.routes();
        let available = routes.iter().map(|r| r.name.clone()).collect();
        routes
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::RouteNotFound {
                name: name.to_string(),
                available,
            })
    }

    /// Write the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        atomic_write(path, content.as_bytes())?;
        Ok(())
    }

    /// Starting configuration written by `wpsync init`.
    #[must_use]
    pub fn template() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            "local".to_string(),
            Environment {
                name: "local".to_string(),
                base_url: "http://mysite.local".to_string(),
                root_path: "/home/me/sites/mysite/public".to_string(),
                access: Access::Local,
                database: DatabaseEngine::default(),
                work_dir: None,
                protected: false,
            },
        );
        environments.insert(
            "staging".to_string(),
            Environment {
                name: "staging".to_string(),
                base_url: "https://staging.example.com".to_string(),
                root_path: "/var/www/staging/public".to_string(),
                access: Access::Ssh {
                    host: "staging.example.com".to_string(),
                    user: Some("deploy".to_string()),
                    port: None,
                    identity_file: None,
                },
                database: DatabaseEngine::default(),
                work_dir: None,
                protected: false,
            },
        );
        environments.insert(
            "production".to_string(),
            Environment {
                name: "production".to_string(),
                base_url: "https://www.example.com".to_string(),
                root_path: "/var/www/production/public".to_string(),
                access: Access::Ssh {
                    host: "example.com".to_string(),
                    user: Some("deploy".to_string()),
                    port: None,
                    identity_file: None,
                },
                database: DatabaseEngine::default(),
                work_dir: None,
                protected: true,
            },
        );

        let mut production_to_local = Route::new("production-to-local", "production", "local");
        production_to_local.mappings = vec![
            UrlMapping::new("https://www.example.com", "http://mysite.local"),
            UrlMapping::new("www.example.com", "mysite.local"),
        ];

        Self {
            environments,
            routes: vec![
                Route::new("local-to-staging", "local", "staging"),
                Route::new("staging-to-production", "staging", "production"),
                production_to_local,
            ],
            options: SyncOptions::default(),
        }
    }
}

/// Environment and route names: letters, digits, `-`, `_`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Resolve, load and validate the configuration.
///
/// Returns the configuration and the path it was read from.
///
/// # Errors
///
/// Returns `ConfigNotFound` when no configuration file can be located.
pub fn load_config(explicit_path: Option<&Path>) -> Result<(SyncConfig, PathBuf)> {
    let path = resolve_config_path(explicit_path).ok_or(Error::ConfigNotFound)?;
    let config = SyncConfig::load(&path)?;
    Ok((config, path))
}
