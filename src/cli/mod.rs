//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// wpsync - WordPress database sync between local, staging and production
#[derive(Parser, Debug)]
#[command(name = "wpsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: nearest .wpsync/config.json)
    #[arg(long, global = true, env = "WPSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Preview: run the checks and print what would happen, write nothing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a template configuration
    Init {
        /// Use global location (~/.wpsync/)
        #[arg(long)]
        global: bool,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,

        /// Keep database dumps and uploads out of the project's .gitignore
        #[arg(long)]
        gitignore: bool,
    },

    /// Show and check environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// List routes and their URL mappings
    Routes,

    /// Copy one environment's database onto another
    Sync(SyncArgs),

    /// Take a backup of an environment's database
    Export {
        /// Environment name
        env: String,
    },

    /// Replace an environment's database with one of its backups
    Restore {
        /// Environment name
        env: String,

        /// Backup file name (in the backups directory) or absolute path
        backup: String,

        /// Confirm overwriting a protected environment
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Replace a URL across an environment's database
    Rewrite {
        /// Environment name
        env: String,

        /// String to search for
        #[arg(long)]
        from: String,

        /// Replacement
        #[arg(long)]
        to: String,

        /// Confirm changing a protected environment
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Manage destination backups
    Backups {
        #[command(subcommand)]
        command: BackupsCommands,
    },

    /// Show past sync runs
    History {
        /// Maximum runs to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Route name (e.g. local-to-staging)
    pub route: String,

    /// Confirm overwriting a protected destination
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Keep the export and transferred snapshot after success
    #[arg(long)]
    pub keep_snapshots: bool,

    /// Skip checksum verification of the transferred snapshot
    #[arg(long)]
    pub no_verify: bool,
}

// ============================================================================
// Environments
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// List configured environments
    List,

    /// Check that environments are reachable and hold a site
    Check {
        /// Environment name (default: all)
        name: Option<String>,
    },
}

// ============================================================================
// Backups
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BackupsCommands {
    /// List backups of an environment, newest first
    List {
        /// Environment name
        env: String,
    },

    /// Remove all but the newest backups
    Prune {
        /// Environment name
        env: String,

        /// Number of backups to keep
        #[arg(long)]
        keep: usize,
    },
}
