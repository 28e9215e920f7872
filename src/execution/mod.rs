//! Pipeline execution engine

pub mod engine;
pub mod executor;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, RunError, RunOutcome};
pub use executor::{ExecutionResult, StepExecutor};
