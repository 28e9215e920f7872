//! File-based executor - hands tasks to an external runtime through the filesystem
//!
//! For every call the request is written to `<tasks_dir>/<effectId>/input.json`
//! and the executor polls for `<tasks_dir>/<effectId>/result.json`.

use crate::agent::{AgentError, TaskExecutor, TaskRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub const INPUT_FILE: &str = "input.json";
pub const RESULT_FILE: &str = "result.json";

/// Executor speaking the `tasks/<effectId>/{input,result}.json` contract
#[derive(Debug, Clone)]
pub struct FileTaskExecutor {
    tasks_dir: PathBuf,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl FileTaskExecutor {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
            poll_interval: Duration::from_millis(500),
            timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tasks_dir(&self) -> &Path {
        &self.tasks_dir
    }

    /// Directory used for one effect
    pub fn effect_dir(&self, effect_id: &uuid::Uuid) -> PathBuf {
        self.tasks_dir.join(effect_id.to_string())
    }

    async fn write_input(&self, dir: &Path, request: &TaskRequest) -> Result<(), AgentError> {
        tokio::fs::create_dir_all(dir).await?;
        let document = serde_json::to_vec_pretty(&request.to_document())
            .map_err(|e| AgentError::Internal(format!("Failed to encode task input: {}", e)))?;

        // Write then rename so watchers never see a partial input file
        let staging = dir.join(format!("{}.tmp", INPUT_FILE));
        tokio::fs::write(&staging, document).await?;
        tokio::fs::rename(&staging, dir.join(INPUT_FILE)).await?;
        Ok(())
    }

    async fn wait_for_result(&self, path: &Path) -> Result<Value, AgentError> {
        let started = Instant::now();
        // A result that fails to parse gets one more poll in case it is mid-write
        let mut parse_failed = false;

        loop {
            match tokio::fs::read(path).await {
                Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => return Ok(value),
                    Err(e) if parse_failed => {
                        return Err(AgentError::InvalidResult(format!(
                            "{} is not valid JSON: {}",
                            path.display(),
                            e
                        )))
                    }
                    Err(e) => {
                        debug!("Result at {} not parseable yet: {}", path.display(), e);
                        parse_failed = true;
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AgentError::Io(e)),
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    warn!("No result at {} after {:?}", path.display(), timeout);
                    return Err(AgentError::Timeout(timeout.as_secs()));
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl TaskExecutor for FileTaskExecutor {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError> {
        let dir = self.effect_dir(&request.effect_id);
        self.write_input(&dir, request).await?;
        info!(
            "Task {} for step {} posted to {}",
            request.task.name,
            request.step_id,
            dir.display()
        );

        self.wait_for_result(&dir.join(RESULT_FILE)).await
    }
}
