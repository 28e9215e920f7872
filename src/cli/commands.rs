//! CLI command definitions

use crate::agent::{ExecutorConfig, ExecutorKind};
use crate::review::{AutoApprove, ConsoleReviewer, DeferReview, ReviewDecision, ReviewGate};
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Run a process
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to process YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// JSON file with the run inputs
    #[arg(long)]
    pub inputs: Option<PathBuf>,

    /// Input overrides (key=value, value parsed as JSON when possible)
    #[arg(short, long, value_parser = parse_key_value)]
    pub input: Vec<(String, String)>,

    #[command(flatten)]
    pub runner: RunnerArgs,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Resume a run suspended at a breakpoint
#[derive(Debug, Args, Clone)]
#[command(group(ArgGroup::new("decision").required(true).args(["approve", "reject"])))]
pub struct ResumeCommand {
    /// ID of the suspended run
    pub run_id: String,

    /// Path to the process YAML file the run was started from
    #[arg(short, long)]
    pub file: PathBuf,

    /// Approve the pending breakpoint
    #[arg(long)]
    pub approve: bool,

    /// Reject the pending breakpoint
    #[arg(long)]
    pub reject: bool,

    /// Reason recorded with a rejection
    #[arg(long, requires = "reject")]
    pub reason: Option<String>,

    #[command(flatten)]
    pub runner: RunnerArgs,

    /// Print the run result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResumeCommand {
    pub fn decision(&self) -> ReviewDecision {
        if self.approve {
            ReviewDecision::Approved
        } else {
            ReviewDecision::Rejected {
                reason: self.reason.clone(),
            }
        }
    }
}

/// Cancel a suspended run
#[derive(Debug, Args, Clone)]
pub struct CancelCommand {
    /// ID of the suspended run
    pub run_id: String,
}

/// List runs waiting at a breakpoint
#[derive(Debug, Args, Clone)]
pub struct PendingCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a process configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to process YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List processes with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Process name to filter by
    #[arg(short, long)]
    pub process: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Settings shared by commands that execute steps
#[derive(Debug, Args, Clone)]
pub struct RunnerArgs {
    /// How tasks are executed
    #[arg(long, value_enum, default_value_t = ExecutorArg::File)]
    pub executor: ExecutorArg,

    /// Directory for `<effectId>/input.json` and `result.json`
    #[arg(long, default_value = "tasks")]
    pub tasks_dir: PathBuf,

    /// How often to look for a task result (milliseconds)
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Agent executable for the subprocess executor
    #[arg(long)]
    pub agent_command: Option<String>,

    /// Argument passed to the agent before the prompt (repeatable)
    #[arg(long = "agent-arg", allow_hyphen_values = true)]
    pub agent_args: Vec<String>,

    /// Timeout for a single task in seconds
    #[arg(long, default_value_t = 10800)]
    pub timeout: u64,

    /// How breakpoints are resolved
    #[arg(long, value_enum, default_value_t = ReviewMode::Console)]
    pub review: ReviewMode,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,

    /// Directory for per-run journals
    #[arg(long, default_value = "runs")]
    pub journal_dir: PathBuf,

    /// Don't write a run journal
    #[arg(long)]
    pub no_journal: bool,
}

impl RunnerArgs {
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::new()
            .with_kind(self.executor.into())
            .with_tasks_dir(self.tasks_dir.clone())
            .with_timeout(self.timeout);
        config.poll_interval_ms = self.poll_interval_ms;

        if let Some(command) = &self.agent_command {
            let args = if self.agent_args.is_empty() {
                config.args.clone()
            } else {
                self.agent_args.clone()
            };
            config = config.with_command(command.clone(), args);
        } else if !self.agent_args.is_empty() {
            config.args = self.agent_args.clone();
        }
        config
    }

    pub fn review_gate(&self) -> Arc<dyn ReviewGate> {
        match self.review {
            ReviewMode::Console => Arc::new(ConsoleReviewer::new()),
            ReviewMode::Auto => Arc::new(AutoApprove),
            ReviewMode::Defer => Arc::new(DeferReview),
        }
    }
}

/// Executor argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutorArg {
    File,
    Subprocess,
}

impl From<ExecutorArg> for ExecutorKind {
    fn from(arg: ExecutorArg) -> Self {
        match arg {
            ExecutorArg::File => ExecutorKind::File,
            ExecutorArg::Subprocess => ExecutorKind::Subprocess,
        }
    }
}

/// Review mode argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReviewMode {
    /// Ask on the terminal
    Console,
    /// Approve every breakpoint
    Auto,
    /// Suspend the run at every breakpoint
    Defer,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Interpret an input override: JSON when it parses, a plain string otherwise
pub fn parse_input_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Build the run inputs from an optional JSON file and key=value overrides
pub fn load_inputs(file: Option<&PathBuf>, overrides: &[(String, String)]) -> Result<Value> {
    let mut inputs = match file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read inputs file {}", path.display()))?;
            match serde_json::from_str::<Value>(&raw)
                .with_context(|| format!("Inputs file {} is not valid JSON", path.display()))?
            {
                Value::Object(map) => map,
                _ => bail!("Inputs file {} must contain a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };

    for (key, value) in overrides {
        inputs.insert(key.clone(), parse_input_value(value));
    }
    Ok(Value::Object(inputs))
}
