//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// op-sync - Sync 1Password secrets into files, AWS and GitHub.
#[derive(Parser, Debug)]
#[command(name = "op-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "OP_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Abort the run after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the changes a sync would make.
    Plan {
        /// Specs to plan.
        #[command(flatten)]
        selection: Selection,
    },

    /// Sync secrets to their targets.
    Apply {
        /// Specs to apply.
        #[command(flatten)]
        selection: Selection,

        /// Skip the confirmation prompt.
        #[arg(short, long, visible_alias = "yes", short_alias = 'y')]
        force: bool,
    },

    /// Check every spec's parameters without contacting anything.
    Validate,
}

/// Which specs a command works on. Defaults to all of them.
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Spec names.
    #[arg(conflicts_with = "backend")]
    pub names: Vec<String>,

    /// Only specs of this type.
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub backend: Option<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}
