//! List routes with the URL mappings they apply.

use crate::cli::commands::{print_json, Workspace};
use crate::error::Result;
use crate::model::UrlMapping;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct RouteRow {
    name: String,
    from: String,
    to: String,
    /// Whether the destination needs `--yes`.
    protected: bool,
    mappings: Vec<UrlMapping>,
}

/// Execute the routes command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub fn execute(config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let config = &workspace.config;

    let mut rows = Vec::new();
    for route in config.routes() {
        let source = config.environment(&route.from)?;
        let dest = config.environment(&route.to)?;
        rows.push(RouteRow {
            mappings: route.effective_mappings(source, dest),
            protected: dest.protected,
            name: route.name,
            from: route.from,
            to: route.to,
        });
    }

    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No routes. Add routes to the configuration, or name environments local/staging/production.");
        return Ok(());
    }

    for row in &rows {
        let protected = if row.protected {
            " (protected)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{}  {} → {}{protected}",
            row.name.bold(),
            row.from,
            row.to
        );
        for mapping in &row.mappings {
            let marker = if mapping.is_idempotent() {
                String::new()
            } else {
                " (not idempotent)".yellow().to_string()
            };
            println!("  {}{marker}", mapping.to_string().dimmed());
        }
    }
    Ok(())
}
