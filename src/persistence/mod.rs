//! Persistence layer for run history, suspended runs and run journals

pub mod journal;
#[cfg(feature = "sqlite")]
pub mod store;

pub use journal::RunJournal;
#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

use crate::core::{BreakpointPosition, RunContext, RunData, RunState, RunStatus};
use crate::review::Breakpoint;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Process name
    pub process_name: String,

    pub version: Option<String>,

    /// Run status
    pub status: RunStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if finished)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of executed steps
    pub executed_steps: usize,

    /// Number of steps skipped by their condition
    pub skipped_steps: usize,

    /// Total number of steps
    pub total_steps: usize,

    /// Artifacts reported so far
    pub artifact_count: usize,

    /// Failure reason, for failed runs
    pub error: Option<String>,
}

impl ExecutionSummary {
    /// Summarize a run from its context and state
    pub fn from_run(ctx: &RunContext, state: &RunState, error: Option<String>) -> Self {
        Self {
            run_id: ctx.run_id,
            process_name: ctx.process_id.clone(),
            version: ctx.version.clone(),
            status: state.status,
            started_at: ctx.started_at,
            completed_at: state.completed_at,
            executed_steps: state.executed_steps,
            skipped_steps: state.skipped_steps,
            total_steps: state.total_steps,
            artifact_count: ctx.data.artifacts.len(),
            error,
        }
    }

    /// Progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.executed_steps + self.skipped_steps) as f64 / self.total_steps as f64
    }
}

/// A run parked at a deferred breakpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedRun {
    pub run_id: Uuid,
    pub process_id: String,
    pub version: Option<String>,

    /// Step the breakpoint belongs to
    pub step_id: String,
    pub step_index: usize,
    pub position: BreakpointPosition,

    /// The payload the reviewer has to answer
    pub breakpoint: Breakpoint,

    /// Run data at the time of suspension
    pub data: RunData,

    pub started_at: DateTime<Utc>,
    pub suspended_at: DateTime<Utc>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or update) a run summary
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run summary by ID
    async fn load_execution(&self, run_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all runs of a process, newest first
    async fn list_executions(&self, process_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all process names with recorded runs
    async fn list_processes(&self) -> Result<Vec<String>>;

    /// Save a suspended run, replacing any previous record for the same run
    async fn save_suspended(&self, run: &SuspendedRun) -> Result<()>;

    async fn load_suspended(&self, run_id: Uuid) -> Result<Option<SuspendedRun>>;

    /// Remove a suspended run; returns whether one existed
    async fn delete_suspended(&self, run_id: Uuid) -> Result<bool>;

    /// List suspended runs, oldest first
    async fn list_suspended(&self) -> Result<Vec<SuspendedRun>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, ExecutionSummary>>,
    suspended: RwLock<HashMap<Uuid, SuspendedRun>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.run_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, run_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&run_id).cloned())
    }

    async fn list_executions(&self, process_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<ExecutionSummary> = execs
            .values()
            .filter(|e| e.process_name == process_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_processes(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.process_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn save_suspended(&self, run: &SuspendedRun) -> Result<()> {
        let mut suspended = self.suspended.write().await;
        suspended.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_suspended(&self, run_id: Uuid) -> Result<Option<SuspendedRun>> {
        let suspended = self.suspended.read().await;
        Ok(suspended.get(&run_id).cloned())
    }

    async fn delete_suspended(&self, run_id: Uuid) -> Result<bool> {
        let mut suspended = self.suspended.write().await;
        Ok(suspended.remove(&run_id).is_some())
    }

    async fn list_suspended(&self) -> Result<Vec<SuspendedRun>> {
        let suspended = self.suspended.read().await;
        let mut runs: Vec<SuspendedRun> = suspended.values().cloned().collect();
        runs.sort_by(|a, b| a.suspended_at.cmp(&b.suspended_at));
        Ok(runs)
    }
}
