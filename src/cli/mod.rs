//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    CancelCommand, HistoryCommand, ListCommand, PendingCommand, ResumeCommand, RunCommand,
    ValidateCommand,
};
use std::ffi::OsString;

/// Linear agent task-pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "taskline")]
#[command(version)]
#[command(about = "Run agent task pipelines with artifact tracking and review breakpoints", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a process
    Run(RunCommand),

    /// Resume a run suspended at a breakpoint
    Resume(ResumeCommand),

    /// Cancel a suspended run
    Cancel(CancelCommand),

    /// List runs waiting at a breakpoint
    Pending(PendingCommand),

    /// Validate a process configuration
    Validate(ValidateCommand),

    /// List processes with recorded runs
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
