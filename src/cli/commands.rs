//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// apprun-provisioner - Declarative `AppRun` Dedicated cluster reconciler.
#[derive(Parser, Debug)]
#[command(name = "apprun-provisioner")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "APPRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: OutputFormat,

    /// Override the `AppRun` Dedicated API base URL.
    #[arg(long, global = true, env = "APPRUN_API_URL")]
    pub api_url: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the cluster configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compare the configuration with the live cluster and print the plan.
    Plan,

    /// Apply the plan to the live cluster.
    Apply {
        /// Activate newly created application versions.
        #[arg(long)]
        activate: bool,

        /// Skip the confirmation prompt.
        #[arg(short = 'y', long)]
        auto_approve: bool,
    },

    /// List the versions of an application.
    Versions {
        /// Application name.
        #[arg(short, long)]
        app: String,
    },

    /// Show the differences between two versions of an application.
    Diff {
        /// Application name.
        #[arg(short, long)]
        app: String,

        /// Base version (defaults to the active version).
        #[arg(long)]
        from: Option<i32>,

        /// Compared version (defaults to the latest version).
        #[arg(long)]
        to: Option<i32>,
    },

    /// Activate a version of an application.
    Activate {
        /// Application name.
        #[arg(short, long)]
        app: String,

        /// Version to activate (defaults to the latest version).
        #[arg(short = 't', long = "target")]
        target: Option<i32>,
    },

    /// Print the live cluster as a configuration file.
    Dump {
        /// Cluster name.
        cluster: String,
    },
}

impl Commands {
    /// Returns true if the command reads the cluster configuration file.
    #[must_use]
    pub const fn needs_config(&self) -> bool {
        !matches!(self, Self::Dump { .. })
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
