//! Executor configuration

use crate::agent::{AgentSubprocessClient, FileTaskExecutor, TaskExecutor};
use std::path::PathBuf;
use std::time::Duration;

/// Which executor implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorKind {
    /// Exchange `input.json`/`result.json` with an external runtime
    #[default]
    File,
    /// Run an agent CLI and parse JSON from its stdout
    Subprocess,
}

/// Configuration for the task executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,

    /// Root directory for file-based task exchange
    pub tasks_dir: PathBuf,

    /// How often the file executor looks for a result
    pub poll_interval_ms: u64,

    /// Agent executable for the subprocess executor
    ///
    /// If not provided, defaults to "claude" (assumes it's on PATH).
    pub command: Option<String>,

    /// Fixed arguments passed before the prompt
    pub args: Vec<String>,

    /// Timeout for a single task in seconds
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::File,
            tasks_dir: PathBuf::from("tasks"),
            poll_interval_ms: 500,
            command: None,
            args: vec!["--print".to_string()],
            timeout_secs: 10800,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: ExecutorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tasks_dir(mut self, tasks_dir: impl Into<PathBuf>) -> Self {
        self.tasks_dir = tasks_dir.into();
        self
    }

    pub fn with_command(mut self, command: String, args: Vec<String>) -> Self {
        self.command = Some(command);
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Build the configured executor
    pub fn build(&self) -> Box<dyn TaskExecutor> {
        match self.kind {
            ExecutorKind::File => Box::new(
                FileTaskExecutor::new(self.tasks_dir.clone())
                    .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
                    .with_timeout(Some(Duration::from_secs(self.timeout_secs))),
            ),
            ExecutorKind::Subprocess => Box::new(AgentSubprocessClient::new(
                self.command.clone().unwrap_or_else(|| "claude".to_string()),
                self.args.clone(),
                self.timeout_secs,
            )),
        }
    }
}
