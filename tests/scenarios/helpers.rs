//! Test utilities shared by the scenario tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use taskline::agent::{AgentError, TaskExecutor, TaskRequest};
use taskline::core::config::ProcessConfig;
use taskline::core::CancellationFlag;
use taskline::persistence::{
    ExecutionSummary, InMemoryPersistence, PersistenceBackend, SuspendedRun,
};
use taskline::review::{Breakpoint, ReviewDecision, ReviewError, ReviewGate};
use taskline::{ExecutionEngine, Pipeline, RunOutcome, RunResult};
use uuid::Uuid;

/// Ordered record of executor calls and reviews, shared between mocks
pub type Timeline = Arc<Mutex<Vec<String>>>;

pub fn timeline() -> Timeline {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(timeline: &Timeline) -> Vec<String> {
    timeline.lock().unwrap().clone()
}

/// One executor call as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub step_id: String,
    pub task: String,
    pub prompt: String,
    pub input: Value,
}

enum Scripted {
    Result(Value),
    Error(fn() -> AgentError),
}

/// Mock executor with scripted results per step id
///
/// Steps without a script succeed with no artifacts.
pub struct MockExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    timeline: Timeline,
    cancel_during: Mutex<Option<(String, CancellationFlag)>>,
}

impl MockExecutor {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            timeline,
            cancel_during: Mutex::new(None),
        }
    }

    /// Set `flag` while `step_id` is executing
    pub fn cancel_during(&self, step_id: &str, flag: CancellationFlag) {
        *self.cancel_during.lock().unwrap() = Some((step_id.to_string(), flag));
    }

    /// Queue a result for the next call of `step_id`
    pub fn respond(self, step_id: &str, result: Value) -> Self {
        self.push(step_id, Scripted::Result(result));
        self
    }

    /// Queue an executor error for the next call of `step_id`
    pub fn error(self, step_id: &str, err: fn() -> AgentError) -> Self {
        self.push(step_id, Scripted::Error(err));
        self
    }

    fn push(&self, step_id: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(step_id.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_steps(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.step_id).collect()
    }

    pub fn call(&self, step_id: &str) -> RecordedCall {
        self.calls()
            .into_iter()
            .find(|c| c.step_id == step_id)
            .unwrap_or_else(|| panic!("step '{}' was never executed", step_id))
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn execute(&self, request: &TaskRequest) -> Result<Value, AgentError> {
        self.timeline
            .lock()
            .unwrap()
            .push(format!("exec:{}", request.step_id));
        self.calls.lock().unwrap().push(RecordedCall {
            step_id: request.step_id.clone(),
            task: request.task.name.clone(),
            prompt: request.prompt.clone(),
            input: request.input.clone(),
        });
        if let Some((step_id, flag)) = self.cancel_during.lock().unwrap().as_ref() {
            if *step_id == request.step_id {
                flag.cancel();
            }
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.step_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Result(value)) => Ok(value),
            Some(Scripted::Error(err)) => Err(err()),
            None => Ok(json!({ "success": true, "artifacts": [] })),
        }
    }
}

/// Reviewer answering breakpoints from a script, approving once it runs out
pub struct ScriptedReviewer {
    decisions: Mutex<VecDeque<ReviewDecision>>,
    seen: Mutex<Vec<Breakpoint>>,
    timeline: Timeline,
    hang: bool,
}

impl ScriptedReviewer {
    pub fn new(timeline: Timeline, decisions: Vec<ReviewDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            seen: Mutex::new(Vec::new()),
            timeline,
            hang: false,
        }
    }

    /// A reviewer that never answers
    pub fn silent(timeline: Timeline) -> Self {
        Self {
            hang: true,
            ..Self::new(timeline, Vec::new())
        }
    }

    pub fn seen(&self) -> Vec<Breakpoint> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewGate for ScriptedReviewer {
    async fn review(&self, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError> {
        self.timeline
            .lock()
            .unwrap()
            .push(format!("review:{}", breakpoint.title));
        self.seen.lock().unwrap().push(breakpoint.clone());

        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.decisions.lock().unwrap().pop_front();
        Ok(next.unwrap_or(ReviewDecision::Approved))
    }
}

/// In-memory store whose `load_suspended` yields like real I/O would
///
/// Lets two concurrent resumes both read the record before either claims it.
#[derive(Default)]
pub struct YieldingStore {
    inner: InMemoryPersistence,
}

impl YieldingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for YieldingStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> anyhow::Result<()> {
        self.inner.save_execution(execution).await
    }

    async fn load_execution(&self, run_id: Uuid) -> anyhow::Result<Option<ExecutionSummary>> {
        self.inner.load_execution(run_id).await
    }

    async fn list_executions(&self, process_name: &str) -> anyhow::Result<Vec<ExecutionSummary>> {
        self.inner.list_executions(process_name).await
    }

    async fn list_processes(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_processes().await
    }

    async fn save_suspended(&self, run: &SuspendedRun) -> anyhow::Result<()> {
        self.inner.save_suspended(run).await
    }

    async fn load_suspended(&self, run_id: Uuid) -> anyhow::Result<Option<SuspendedRun>> {
        let found = self.inner.load_suspended(run_id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn delete_suspended(&self, run_id: Uuid) -> anyhow::Result<bool> {
        self.inner.delete_suspended(run_id).await
    }

    async fn list_suspended(&self) -> anyhow::Result<Vec<SuspendedRun>> {
        self.inner.list_suspended().await
    }
}

/// Load a pipeline from YAML, panicking on invalid configs
pub fn pipeline(yaml: &str) -> Pipeline {
    ProcessConfig::from_yaml(yaml)
        .expect("process config should be valid")
        .to_pipeline()
        .expect("pipeline should build")
}

/// A successful step result with the given artifact paths and extra fields
pub fn ok(paths: &[&str], fields: Value) -> Value {
    let mut result = json!({
        "success": true,
        "artifacts": paths.iter().map(|p| json!({ "path": p, "format": "markdown" })).collect::<Vec<_>>(),
    });
    if let (Some(target), Some(extra)) = (result.as_object_mut(), fields.as_object()) {
        target.extend(extra.clone());
    }
    result
}

/// Run a pipeline to a final result
pub async fn run_to_result<E: TaskExecutor>(
    engine: &ExecutionEngine<E>,
    pipeline: &Pipeline,
    inputs: Value,
) -> RunResult {
    match engine.run(pipeline, inputs).await.expect("run should not abort") {
        RunOutcome::Finished(result) => result,
        RunOutcome::Suspended { step_id, .. } => panic!("run suspended at step '{}'", step_id),
    }
}

pub fn artifact_paths(result: &RunResult) -> Vec<String> {
    result.artifacts().iter().map(|a| a.path.clone()).collect()
}

/// Assert the run ended in the failure form
pub fn assert_failed(result: &RunResult) {
    assert!(
        !result.is_success(),
        "expected failure, got {}",
        result.to_json()
    );
}

/// Assert the run ended in the success form
pub fn assert_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "expected success, got {}",
        result.to_json()
    );
}
