//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run has not started
    NotStarted,
    /// Run is executing a step
    Running,
    /// Run is waiting on a breakpoint decision
    AwaitingReview,
    /// Run is parked at a deferred breakpoint and can be resumed
    Suspended,
    /// Run completed successfully
    Completed,
    /// Run failed
    Failed,
    /// Run was cancelled
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "NotStarted",
            RunStatus::Running => "Running",
            RunStatus::AwaitingReview => "AwaitingReview",
            RunStatus::Suspended => "Suspended",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Cancelled => "Cancelled",
        }
    }

    /// Snake-case name, as written to run journals
    pub fn snake_name(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::Running => "running",
            RunStatus::AwaitingReview => "awaiting_review",
            RunStatus::Suspended => "suspended",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the stored name of a status
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "NotStarted" => RunStatus::NotStarted,
            "Running" => RunStatus::Running,
            "AwaitingReview" => RunStatus::AwaitingReview,
            "Suspended" => RunStatus::Suspended,
            "Completed" => RunStatus::Completed,
            "Failed" => RunStatus::Failed,
            "Cancelled" => RunStatus::Cancelled,
            _ => return None,
        })
    }

    /// Check if the run can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current status
    pub status: RunStatus,

    /// Index of the step being executed or reviewed
    pub current_step: Option<usize>,

    /// When the run started
    pub started_at: Option<DateTime<Utc>>,

    /// When the run completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of executed steps
    pub executed_steps: usize,

    /// Number of steps skipped by their condition
    pub skipped_steps: usize,
}

impl RunState {
    /// Create a new run state
    pub fn new(run_id: Uuid, total_steps: usize) -> Self {
        Self {
            run_id,
            status: RunStatus::NotStarted,
            current_step: None,
            started_at: None,
            completed_at: None,
            total_steps,
            executed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark run as started (or resumed) at a given time
    pub fn start(&mut self, started_at: DateTime<Utc>) {
        self.status = RunStatus::Running;
        self.started_at = Some(started_at);
    }

    /// Enter step `index`
    pub fn enter_step(&mut self, index: usize) {
        self.status = RunStatus::Running;
        self.current_step = Some(index);
    }

    pub fn await_review(&mut self) {
        self.status = RunStatus::AwaitingReview;
    }

    pub fn suspend(&mut self) {
        self.status = RunStatus::Suspended;
    }

    /// Mark run as completed
    pub fn complete(&mut self) {
        self.finish(RunStatus::Completed);
    }

    /// Mark run as failed
    pub fn fail(&mut self) {
        self.finish(RunStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(RunStatus::Cancelled);
    }

    fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.executed_steps + self.skipped_steps) as f64 / self.total_steps as f64
    }
}
