//! wpsync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use wpsync::cli::commands;
use wpsync::cli::{Cli, Commands};
use wpsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.dry_run {
        wpsync::DRY_RUN.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let config = cli.config.as_ref();
    match &cli.command {
        Commands::Init {
            global,
            force,
            gitignore,
        } => commands::init::execute(*global, *force, *gitignore, json),
        Commands::Version => commands::version::execute(json),

        // Environments and routes
        Commands::Env { command } => commands::env::execute(command, config, json),
        Commands::Routes => commands::routes::execute(config, json),

        // Pipeline
        Commands::Sync(args) => commands::sync::execute(args, config, json),

        // Single-environment operations
        Commands::Export { env } => commands::export::execute(env, config, json),
        Commands::Restore { env, backup, yes } => {
            commands::restore::execute(env, backup, *yes, config, json)
        }
        Commands::Rewrite { env, from, to, yes } => {
            commands::rewrite::execute(env, from, to, *yes, config, json)
        }
        Commands::Backups { command } => commands::backups::execute(command, config, json),

        // Journal
        Commands::History { limit } => commands::history::execute(*limit, config, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
