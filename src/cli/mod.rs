//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Clinic Backup - export and restore clinic records
#[derive(Parser, Debug)]
#[command(name = "clinic-backup", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store path (default: ~/.clinic-backup/data/clinic.db)
    #[arg(long, global = true, env = "CB_STORE")]
    pub store: Option<PathBuf>,

    /// Clinic id; scopes billing items and clinic-owned key-value keys
    #[arg(long, global = true, env = "CB_CLINIC")]
    pub clinic: Option<String>,

    /// Message language (zh, en)
    #[arg(long, global = true, env = "CB_LANG")]
    pub lang: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Preview changes without writing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Answer yes to the restore confirmation
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Increase logging verbosity (-v, -vv)
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
    /// Create the clinic store
    Init {
        /// Overwrite an existing store
        #[arg(long)]
        force: bool,

        /// Seed the default billing catalog
        #[arg(long)]
        seed_billing: bool,
    },

    /// Export every collection into a timestamped backup file
    Export {
        /// Directory to write the backup into (default: current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the backup to stdout instead of writing a file
        #[arg(long, conflicts_with = "output")]
        stdout: bool,
    },

    /// Restore a backup file, replacing every collection
    Import {
        /// Backup file to restore
        file: PathBuf,

        /// Normalize consultation ids, dates and patient names first
        #[arg(long)]
        normalize: bool,
    },

    /// Summarize a backup file without restoring it
    Inspect {
        /// Backup file to read
        file: PathBuf,
    },

    /// Show store location, readiness and collection counts
    Status,

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
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
