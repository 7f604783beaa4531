//! Environment commands: list and check.

use crate::cli::EnvCommands;
use crate::cli::commands::{print_json, Workspace};
use crate::error::{Error, Result};
use crate::host::SystemRunner;
use crate::model::{DatabaseEngine, Environment};
use crate::site::open_site;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;

#[derive(Serialize)]
struct EnvironmentRow<'a> {
    name: &'a str,
    base_url: &'a str,
    domain: String,
    location: String,
    engine: &'static str,
    work_dir: String,
    protected: bool,
}

impl<'a> EnvironmentRow<'a> {
    fn new(env: &'a Environment) -> Self {
        Self {
            name: &env.name,
            base_url: &env.base_url,
            domain: env.domain(),
            location: env.location(),
            engine: engine_name(&env.database),
            work_dir: env.work_dir(),
            protected: env.protected,
        }
    }
}

#[derive(Serialize)]
struct CheckRow {
    name: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

const fn engine_name(engine: &DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::WpCli { .. } => "wp-cli",
        DatabaseEngine::Sqlite { .. } => "sqlite",
    }
}

/// Execute environment commands.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the named
/// environment does not exist, or a checked environment is not usable.
pub fn execute(command: &EnvCommands, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    match command {
        EnvCommands::List => list(&workspace, json),
        EnvCommands::Check { name } => check(&workspace, name.as_deref(), json),
    }
}

fn list(workspace: &Workspace, json: bool) -> Result<()> {
    let rows: Vec<EnvironmentRow<'_>> = workspace
        .config
        .environments
        .values()
        .map(EnvironmentRow::new)
        .collect();

    if json {
        return print_json(&rows);
    }

    for row in &rows {
        let protected = if row.protected {
            " (protected)".yellow().to_string()
        } else {
            String::new()
        };
        println!("{}{protected}", row.name.bold());
        println!("  url:      {}", row.base_url);
        println!("  location: {}", row.location);
        println!("  engine:   {}", row.engine);
        println!("  work dir: {}", row.work_dir.dimmed());
    }
    Ok(())
}

fn check(workspace: &Workspace, name: Option<&str>, json: bool) -> Result<()> {
    let targets: Vec<&Environment> = match name {
        Some(name) => vec![workspace.config.environment(name)?],
        None => workspace.config.environments.values().collect(),
    };

    let runner = SystemRunner;
    let mut rows = Vec::with_capacity(targets.len());
    let mut first_error: Option<Error> = None;

    for env in targets {
        let result = open_site(env, &runner, workspace.connect_timeout()).and_then(|site| site.probe());
        match result {
            Ok(()) => rows.push(CheckRow {
                name: env.name.clone(),
                ok: true,
                error: None,
            }),
            Err(e) => {
                warn!(env = %env.name, error = %e, "Environment check failed");
                rows.push(CheckRow {
                    name: env.name.clone(),
                    ok: false,
                    error: Some(e.to_string()),
                });
                first_error.get_or_insert(Error::Sync(e));
            }
        }
    }

    if json {
        print_json(&rows)?;
    } else {
        for row in &rows {
            match &row.error {
                None => println!("{} {}", "✓".green(), row.name),
                Some(error) => println!("{} {}: {}", "✗".red(), row.name, error.dimmed()),
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}
