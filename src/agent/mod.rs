//! Task executors - the external runtime that performs agent tasks

pub mod client;
pub mod file_client;
pub mod response;
pub mod subprocess_client;

use crate::core::TaskDefinition;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub use client::{ExecutorConfig, ExecutorKind};
pub use file_client::FileTaskExecutor;
pub use response::{extract_first_json, AgentError};
pub use subprocess_client::AgentSubprocessClient;

/// Everything an executor needs to perform one step
#[derive(Debug, Clone)]
pub struct TaskRequest {
    /// Unique id of this executor call
    pub effect_id: Uuid,

    /// Run the call belongs to
    pub run_id: Uuid,

    /// Step being executed
    pub step_id: String,

    /// Task definition of the step
    pub task: Arc<TaskDefinition>,

    /// Fully rendered prompt
    pub prompt: String,

    /// Computed step input
    pub input: Value,
}

impl TaskRequest {
    /// The `input.json` document handed to external executors
    pub fn to_document(&self) -> Value {
        json!({
            "effectId": self.effect_id.to_string(),
            "runId": self.run_id.to_string(),
            "step": self.step_id,
            "task": self.task.name,
            "kind": self.task.kind.as_str(),
            "prompt": self.prompt,
            "input": self.input,
            "outputSchema": self.task.output_schema,
        })
    }
}

/// Trait for task execution - allows for different implementations
///
/// Returns the raw JSON result object; the runner interprets `success`
/// and `artifacts`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError>;
}

#[async_trait]
impl<T: TaskExecutor + ?Sized> TaskExecutor for Box<T> {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<T: TaskExecutor + ?Sized> TaskExecutor for Arc<T> {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError> {
        (**self).execute(request).await
    }
}
