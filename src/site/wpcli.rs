//! WP-CLI backed sites.

use tracing::debug;

use crate::host::Host;
use crate::model::{Environment, UrlMapping};
use crate::site::Site;
use crate::sync::{SyncError, SyncResult};

/// A WordPress install whose database is driven through WP-CLI.
pub struct WpCliSite<'a> {
    env: &'a Environment,
    host: Host<'a>,
    binary: String,
}

impl<'a> WpCliSite<'a> {
    #[must_use]
    pub fn new(env: &'a Environment, host: Host<'a>, binary: &str) -> Self {
        Self {
            env,
            host,
            binary: binary.to_string(),
        }
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        std::iter::once(format!("--path={}", self.env.root_path))
            .chain(rest.iter().map(|s| (*s).to_string()))
            .collect()
    }

    fn wp(&self, rest: &[&str]) -> SyncResult<String> {
        let output = self.host.exec_checked(&self.binary, &self.args(rest))?;
        Ok(output.stdout)
    }

    fn search_replace_count(&self, mapping: &UrlMapping, dry_run: bool) -> SyncResult<u64> {
        let mut rest = vec![
            "search-replace",
            mapping.from.as_str(),
            mapping.to.as_str(),
            "--all-tables",
        ];
        if dry_run {
            rest.push("--dry-run");
        }
        rest.push("--format=count");

        let stdout = self.wp(&rest)?;
        parse_count(&stdout).ok_or_else(|| {
            SyncError::Verification(format!(
                "unexpected search-replace output on {}: {}",
                self.env.name,
                stdout.trim()
            ))
        })
    }
}

impl Site for WpCliSite<'_> {
    fn environment(&self) -> &Environment {
        self.env
    }

    fn host(&self) -> &Host<'_> {
        &self.host
    }

    fn engine(&self) -> &'static str {
        "wp-cli"
    }

    fn probe(&self) -> SyncResult<()> {
        self.host.probe()?;
        let output = self.host.exec(&self.binary, &self.args(&["core", "is-installed"]))?;
        if output.success() {
            return Ok(());
        }
        Err(SyncError::Preflight(format!(
            "no WordPress install answers at {} ({})",
            self.env.location(),
            output.summary()
        )))
    }

    fn export(&self, path: &str) -> SyncResult<()> {
        debug!(env = %self.env.name, path, "wp db export");
        self.wp(&["db", "export", path]).map(|_| ())
    }

    fn import(&self, path: &str) -> SyncResult<()> {
        debug!(env = %self.env.name, path, "wp db import");
        self.wp(&["db", "import", path]).map(|_| ())
    }

    fn count_occurrences(&self, mapping: &UrlMapping) -> SyncResult<u64> {
        self.search_replace_count(mapping, true)
    }

    fn search_replace(&self, mapping: &UrlMapping) -> SyncResult<u64> {
        self.search_replace_count(mapping, false)
    }
}

/// `--format=count` prints a single number, possibly after warnings.
fn parse_count(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse()
        .ok()
}
