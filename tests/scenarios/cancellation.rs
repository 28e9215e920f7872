//! Test: Cancellation - a run cancelled mid-step stops before anything else happens

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use taskline::persistence::{InMemoryPersistence, PersistenceBackend};
use taskline::{ExecutionEngine, RunError, RunStatus};

const PROCESS: &str = r#"
name: "hazop-study"
tasks:
  - name: identify
    prompt:
      task: "Identify deviations for {{ inputs.node }}"
  - name: assess
    prompt:
      task: "Assess the consequences"
steps:
  - id: identify
    task: identify
    breakpoint:
      title: "Deviation review"
      question: "Are the deviations complete?"
  - id: assess
    task: assess
    breakpoint:
      title: "Assessment go-ahead"
      question: "Start the assessment?"
      position: before
"#;

/// Cancelling while step 1 executes ends the run at the next boundary
#[tokio::test]
async fn test_cancel_during_step_stops_run() {
    let timeline = timeline();
    let store = Arc::new(InMemoryPersistence::new());
    let executor = MockExecutor::new(timeline.clone())
        .respond("identify", ok(&["deviations.md"], json!({ "count": 7 })));
    let reviewer = Arc::new(ScriptedReviewer::new(timeline.clone(), Vec::new()));
    let engine = ExecutionEngine::new(executor, reviewer.clone()).with_store(store.clone());
    engine
        .executor()
        .cancel_during("identify", engine.cancellation());

    let err = engine
        .run(&pipeline(PROCESS), json!({ "node": "reactor feed" }))
        .await
        .unwrap_err();

    let RunError::Cancelled { run_id } = err else {
        panic!("expected cancellation, got {:?}", err);
    };
    assert_eq!(engine.executor().called_steps(), vec!["identify"]);
    assert!(reviewer.seen().is_empty());
    assert_eq!(entries(&timeline), vec!["exec:identify"]);

    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.executed_steps, 1);
    assert!(summary.completed_at.is_some());
    assert!(store.list_suspended().await.unwrap().is_empty());
}

/// A flag raised before the run starts stops it before the first step
#[tokio::test]
async fn test_cancel_before_start_runs_nothing() {
    let timeline = timeline();
    let store = Arc::new(InMemoryPersistence::new());
    let engine = ExecutionEngine::new(
        MockExecutor::new(timeline.clone()),
        Arc::new(ScriptedReviewer::new(timeline.clone(), Vec::new())),
    )
    .with_store(store.clone());
    engine.cancellation().cancel();

    let err = engine
        .run(&pipeline(PROCESS), json!({ "node": "reactor feed" }))
        .await
        .unwrap_err();

    let RunError::Cancelled { run_id } = err else {
        panic!("expected cancellation, got {:?}", err);
    };
    assert!(entries(&timeline).is_empty());
    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.executed_steps, 0);
}
