//! Step executor - runs individual steps with the task executor

use crate::{
    agent::{AgentError, TaskExecutor, TaskRequest},
    core::{RunContext, Step, StepResult, TaskDefinition},
};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// The executor returned a well-formed result (which may report `success: false`)
    Completed(StepResult),
    /// The executor call itself failed
    Failed { error: String, kind: &'static str },
}

impl ExecutionResult {
    fn from_error(step_id: &str, err: AgentError) -> Self {
        error!("Executor error for step {}: {}", step_id, err);
        ExecutionResult::Failed {
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

/// Executes a single step
pub struct StepExecutor<E> {
    executor: E,
}

impl<E: TaskExecutor> StepExecutor<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Build the executor request for a step: fresh effect id, rendered prompt
    pub fn prepare(
        &self,
        ctx: &RunContext,
        step: &Step,
        task: &Arc<TaskDefinition>,
        input: Value,
    ) -> TaskRequest {
        let prompt = task.render_prompt(&ctx.scope(), &input);
        debug!("Rendered prompt for step {}: {}", step.id, prompt);

        TaskRequest {
            effect_id: Uuid::new_v4(),
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            task: Arc::clone(task),
            prompt,
            input,
        }
    }

    /// Execute a prepared request and check the result contract
    pub async fn execute(&self, request: &TaskRequest, timeout_secs: Option<u64>) -> ExecutionResult {
        info!("Executing step: {} ({})", request.step_id, request.task.name);

        let outcome = match timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), self.executor.execute(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AgentError::Timeout(secs)),
            },
            None => self.executor.execute(request).await,
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => return ExecutionResult::from_error(&request.step_id, err),
        };

        match StepResult::from_value(value) {
            Ok(result) => {
                info!(
                    "Step {} returned success={} with {} artifact(s)",
                    request.step_id,
                    result.success,
                    result.artifacts.len()
                );
                ExecutionResult::Completed(result)
            }
            Err(e) => ExecutionResult::from_error(
                &request.step_id,
                AgentError::InvalidResult(e.to_string()),
            ),
        }
    }
}
