//! Stand-alone URL rewrite of one environment.

use crate::cli::commands::{print_json, require_confirmation, Workspace};
use crate::error::{Error, Result};
use crate::host::SystemRunner;
use crate::model::UrlMapping;
use crate::site::open_site;
use crate::sync::SyncError;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct RewriteOutput<'a> {
    environment: &'a str,
    mapping: &'a UrlMapping,
    found: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    replaced: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    residual: Option<u64>,
    dry_run: bool,
}

/// Execute the rewrite command.
///
/// With `--dry-run` only the occurrences are counted.
///
/// # Errors
///
/// Returns `InvalidArgument` for an unusable mapping, `ProtectedEnvironment`
/// without `--yes`, or a verification error when occurrences remain.
pub fn execute(
    env_name: &str,
    from: &str,
    to: &str,
    yes: bool,
    config_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let mapping = UrlMapping::new(from, to);
    mapping.validate().map_err(Error::InvalidArgument)?;

    let workspace = Workspace::load(config_path)?;
    let env = workspace.config.environment(env_name)?;
    require_confirmation(env, yes)?;

    let runner = SystemRunner;
    let site = open_site(env, &runner, workspace.connect_timeout())?;
    site.probe()?;

    let dry_run = crate::is_dry_run();
    let found = site.count_occurrences(&mapping)?;

    let (replaced, residual) = if dry_run {
        (None, None)
    } else {
        let replaced = site.search_replace(&mapping)?;
        let residual = if mapping.is_idempotent() {
            Some(site.count_occurrences(&mapping)?)
        } else {
            None
        };
        (Some(replaced), residual)
    };

    if json {
        print_json(&RewriteOutput {
            environment: &env.name,
            mapping: &mapping,
            found,
            replaced,
            residual,
            dry_run,
        })?;
    } else {
        println!("{} on {}", mapping.to_string().bold(), env.name);
        println!("  {found} occurrence(s) found");
        if let Some(replaced) = replaced {
            println!("  {} {replaced} replaced", "✓".green());
        }
    }

    match residual {
        Some(left) if left > 0 => Err(SyncError::Verification(format!(
            "{left} occurrence(s) of '{}' left in {} after the rewrite",
            mapping.from, env.name
        ))
        .into()),
        _ => Ok(()),
    }
}
