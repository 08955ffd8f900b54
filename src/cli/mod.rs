//! CLI module for the `AppRun` provisioner.
//!
//! This module provides the command-line interface for planning and
//! applying cluster configurations and for managing application versions.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
