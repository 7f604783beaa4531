//! Run a route: move the source database onto the destination.
//!
//! The pipeline itself lives in [`crate::sync::pipeline`]; this command
//! resolves the route, applies the confirmation gate, journals the report
//! and applies backup retention after a successful run.

use crate::cli::SyncArgs;
use crate::cli::commands::{print_json, require_confirmation, Workspace};
use crate::error::{Error, Result};
use crate::host::SystemRunner;
use crate::site::open_site;
use crate::sync::{
    append_run, prune_backups, Outcome, PipelineOptions, RunReport, ScpTransport, SyncPipeline,
    SyncPlan,
};
use chrono::Utc;
use colored::Colorize;
use std::path::PathBuf;
use tracing::warn;

/// Execute the sync command.
///
/// # Errors
///
/// Returns configuration and lookup errors before the run starts, and
/// `RunFailed` when the pipeline stops at a stage.
pub fn execute(args: &SyncArgs, config_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let workspace = Workspace::load(config_path)?;
    let config = &workspace.config;

    let route = config.route(&args.route)?;
    let source_env = config.environment(&route.from)?;
    let dest_env = config.environment(&route.to)?;
    require_confirmation(dest_env, args.yes)?;

    let dry_run = crate::is_dry_run();
    let runner = SystemRunner;
    let source = open_site(source_env, &runner, workspace.connect_timeout())?;
    let dest = open_site(dest_env, &runner, workspace.connect_timeout())?;
    let transport = ScpTransport::new(&runner);

    let options = PipelineOptions {
        verify_checksums: config.options.verify_checksums && !args.no_verify,
        dry_run,
        keep_snapshots: args.keep_snapshots,
    };
    let plan = SyncPlan::new(
        &route.name,
        source_env,
        dest_env,
        route.effective_mappings(source_env, dest_env),
        Utc::now(),
    );

    let report = SyncPipeline::new(source.as_ref(), dest.as_ref(), &transport, options).run(&plan);

    if !dry_run {
        append_run(workspace.state_dir(), &report)?;
    }

    let mut pruned = Vec::new();
    if report.is_success() && !dry_run {
        if let Some(keep) = config.options.keep_backups {
            match prune_backups(dest.as_ref(), keep) {
                Ok(removed) => pruned = removed,
                Err(e) => warn!(env = %dest_env.name, error = %e, "Backup pruning failed"),
            }
        }
    }

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
        if !pruned.is_empty() {
            println!("  {} old backup(s) removed", pruned.len());
        }
    }

    match report.outcome {
        Outcome::Failed {
            stage,
            kind,
            message,
        } => Err(Error::RunFailed {
            stage: stage.as_str().to_string(),
            message,
            kind,
            backup: report.backup.map(|b| (b.environment, b.path)),
        }),
        _ => Ok(()),
    }
}

/// Human-readable outcome label.
pub(crate) fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Running => "running".yellow().to_string(),
        Outcome::Completed => "completed".green().to_string(),
        Outcome::DryRun => "dry run".cyan().to_string(),
        Outcome::Failed { stage, .. } => format!("failed at {}", stage.as_str()).red().to_string(),
    }
}

fn print_report(report: &RunReport) {
    println!(
        "{} {} → {} ({})",
        report.route.bold(),
        report.source,
        report.destination,
        report.id.dimmed()
    );

    for step in &report.steps {
        let failed = matches!(&report.outcome, Outcome::Failed { stage, .. } if *stage == step.stage);
        let mark = if failed { "✗".red() } else { "✓".green() };
        let detail = step.detail.as_deref().unwrap_or_default();
        println!(
            "  {mark} {:<17} {:>6} ms  {}",
            step.stage.as_str(),
            step.duration_ms,
            detail.dimmed()
        );
    }

    for rewrite in &report.rewrites {
        let mut line = format!("  {}: {} found", rewrite.mapping, rewrite.expected);
        if let Some(replaced) = rewrite.replaced {
            line.push_str(&format!(", {replaced} replaced"));
        }
        if let Some(residual) = rewrite.residual {
            line.push_str(&format!(", {residual} left"));
        }
        println!("{line}");
    }

    if !report.retained.is_empty() {
        println!("  Kept:");
        for snapshot in &report.retained {
            println!("    {} ({})", snapshot.path, snapshot.host_environment);
        }
    }

    println!("{} in {} ms", outcome_label(&report.outcome), report.duration_ms());
}
