//! Run context - the data a run owns and the capabilities steps get

use crate::core::artifact::{Artifact, ArtifactLog};
use crate::core::result::RunMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Data accumulated by a run
///
/// This is everything needed to continue a run later, so it is what gets
/// persisted when a run is suspended at a breakpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    /// The inputs the run was started with
    pub inputs: Value,

    /// Raw results of executed steps (step_id -> result object)
    pub results: BTreeMap<String, Value>,

    /// Step ids in the order they were executed
    pub executed: Vec<String>,

    /// Step ids skipped by their condition
    #[serde(default)]
    pub skipped: Vec<String>,

    /// Artifacts reported so far
    pub artifacts: ArtifactLog,
}

impl RunData {
    pub fn new(inputs: Value) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    /// Record the result of an executed step
    pub fn record(&mut self, step_id: &str, result: Value, artifacts: &[Artifact]) {
        self.artifacts.extend_from(artifacts);
        self.results.insert(step_id.to_string(), result);
        self.executed.push(step_id.to_string());
    }

    /// Record a step skipped by its condition
    pub fn skip(&mut self, step_id: &str) {
        self.skipped.push(step_id.to_string());
    }

    /// Get the result of a step
    pub fn result(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    /// The id of the last executed step
    pub fn last_executed(&self) -> Option<&str> {
        self.executed.last().map(String::as_str)
    }

    /// JSON view used by bindings, conditions and prompt templates
    ///
    /// Shape: `{ inputs, steps: { <id>: result }, artifacts, run_id }`.
    pub fn scope(&self, run_id: Uuid) -> Value {
        let steps: Map<String, Value> = self
            .results
            .iter()
            .map(|(id, result)| (id.clone(), result.clone()))
            .collect();

        json!({
            "inputs": self.inputs,
            "steps": steps,
            "artifacts": self.artifacts,
            "run_id": run_id.to_string(),
        })
    }
}

/// Shared flag used to cancel an in-flight run
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context handed to every step of a run
///
/// Passed explicitly by reference; nothing about a run lives in globals.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique run ID
    pub run_id: Uuid,

    /// Process name the run belongs to
    pub process_id: String,

    /// Process version, if declared
    pub version: Option<String>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Data accumulated so far
    pub data: RunData,

    cancellation: CancellationFlag,
}

impl RunContext {
    /// Create a context for a fresh run
    pub fn new(process_id: impl Into<String>, version: Option<String>, inputs: Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            process_id: process_id.into(),
            version,
            started_at: Utc::now(),
            data: RunData::new(inputs),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Rebuild the context of a suspended run
    pub fn restore(
        run_id: Uuid,
        process_id: impl Into<String>,
        version: Option<String>,
        started_at: DateTime<Utc>,
        data: RunData,
    ) -> Self {
        Self {
            run_id,
            process_id: process_id.into(),
            version,
            started_at,
            data,
            cancellation: CancellationFlag::new(),
        }
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    /// Current wall-clock time
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Log a message tagged with this run
    pub fn log(&self, message: &str) {
        info!(run_id = %self.run_id, process = %self.process_id, "{}", message);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// JSON view of the run for bindings and templates
    pub fn scope(&self) -> Value {
        self.data.scope(self.run_id)
    }

    /// Metadata stamped on the run result
    pub fn metadata(&self) -> RunMetadata {
        RunMetadata {
            process_id: self.process_id.clone(),
            run_id: self.run_id,
            version: self.version.clone(),
            timestamp: self.now(),
        }
    }

    /// Milliseconds since the run started
    pub fn elapsed_ms(&self) -> u64 {
        (self.now() - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Resolve a dotted path (`a.b.0.c`) inside a JSON value
///
/// Numeric segments index into arrays. An empty path returns the root.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Truthiness of a JSON value: null, false, 0 and "" are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
