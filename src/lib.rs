//! taskline - a linear agent task-pipeline runner
//!
//! Processes are YAML files declaring tasks (prompt + output contract) and an
//! ordered list of steps. A run calls an external task executor for every
//! step, accumulates the artifacts the steps report, pauses at breakpoints
//! for human review and stops early when a gating step fails.

pub mod agent;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod review;

// Re-export commonly used types
pub use agent::{AgentError, ExecutorConfig, TaskExecutor, TaskRequest};
pub use core::{Artifact, Pipeline, RunContext, RunResult, RunStatus, Step, TaskDefinition};
pub use execution::{ExecutionEngine, ExecutionEvent, RunError, RunOutcome};
pub use review::{Breakpoint, ReviewDecision, ReviewGate};
