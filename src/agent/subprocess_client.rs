//! Subprocess executor - runs an agent CLI in print mode

use crate::agent::response::parse_agent_output;
use crate::agent::{AgentError, TaskExecutor, TaskRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Executor that runs an agent command as a subprocess
#[derive(Debug, Clone)]
pub struct AgentSubprocessClient {
    /// Path to the agent executable
    command: String,

    /// Arguments placed before the prompt
    args: Vec<String>,

    /// Timeout for command execution in seconds
    timeout_secs: u64,
}

impl AgentSubprocessClient {
    /// Create a new subprocess client
    ///
    /// # Arguments
    /// * `command` - Path to the agent executable (e.g., "claude", "/usr/local/bin/agent")
    /// * `args` - Fixed arguments; the rendered prompt is appended as the last one
    /// * `timeout_secs` - Timeout for command execution in seconds
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command: command.into(),
            args,
            timeout_secs,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command with `prompt` and return its raw stdout
    ///
    /// # Errors
    /// Returns `AgentError` if:
    /// - The executable cannot be spawned
    /// - It exits with a non-zero status
    /// - The command times out
    pub async fn run_prompt(&self, prompt: &str) -> Result<Vec<u8>, AgentError> {
        debug!(
            "Spawning {} with prompt length: {}",
            self.command,
            prompt.len()
        );

        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.command)
                .args(&self.args)
                .arg(prompt)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AgentError::Timeout(self.timeout_secs))?;

        let output = result.map_err(|e| {
            AgentError::Internal(format!("Failed to execute {}: {}", self.command, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.command, exit_code, stderr.trim());
            return Err(AgentError::Api(format!(
                "{} exited with code {}: {}",
                self.command,
                exit_code,
                stderr.trim()
            )));
        }

        debug!("{} returned {} bytes of output", self.command, output.stdout.len());
        Ok(output.stdout)
    }
}

#[async_trait]
impl TaskExecutor for AgentSubprocessClient {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError> {
        let stdout = self.run_prompt(&request.prompt).await?;
        parse_agent_output(&stdout)
    }
}
