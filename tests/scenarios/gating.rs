//! Test: Gating - failing gating steps short-circuit the run

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use taskline::agent::AgentError;
use taskline::review::AutoApprove;
use taskline::ExecutionEngine;

const THREE_STEPS: &str = r#"
name: "lint-and-publish"
version: "2.1"
tasks:
  - name: collect
    prompt:
      task: "Collect the sources"
  - name: lint
    prompt:
      task: "Lint the sources"
  - name: publish
    prompt:
      task: "Publish the bundle"
steps:
  - id: collect
    task: collect
  - id: lint
    task: lint
    gating: true
  - id: publish
    task: publish
"#;

/// A failing gating step stops the run; its result becomes the failure details
#[tokio::test]
async fn test_gating_step_failure_short_circuits() {
    let lint_result = json!({
        "success": false,
        "artifacts": [{ "path": "lint-report.md" }],
        "error": "3 lint errors",
        "issues": ["unused import", "missing docs", "dead code"],
    });
    let executor = MockExecutor::new(timeline())
        .respond("collect", ok(&["sources.md"], json!({})))
        .respond("lint", lint_result.clone());
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(THREE_STEPS), json!({})).await;

    assert_failed(&result);
    assert_eq!(result.error(), Some("3 lint errors"));
    assert_eq!(result.details(), Some(&lint_result));
    assert_eq!(engine.executor().called_steps(), vec!["collect", "lint"]);

    let contract = result.to_json();
    assert_eq!(contract["success"], json!(false));
    assert_eq!(contract["metadata"]["processId"], json!("lint-and-publish"));
    assert_eq!(contract["metadata"]["version"], json!("2.1"));
}

/// Without an `error` field the message names the step
#[tokio::test]
async fn test_gating_failure_default_message() {
    let executor = MockExecutor::new(timeline())
        .respond("lint", json!({ "success": false, "artifacts": [] }));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(THREE_STEPS), json!({})).await;

    assert_failed(&result);
    assert_eq!(result.error(), Some("Gating step 'lint' reported failure"));
}

/// Only the first step gates unless configured otherwise
#[tokio::test]
async fn test_non_gating_failure_continues() {
    let executor = MockExecutor::new(timeline())
        .respond("lint", json!({ "success": false, "artifacts": [] }))
        .respond("publish", ok(&["bundle.zip"], json!({ "published": true })));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));
    let yaml = THREE_STEPS.replace("    gating: true\n", "");

    let result = run_to_result(&engine, &pipeline(&yaml), json!({})).await;

    assert_succeeded(&result);
    assert_eq!(result.field("published"), Some(&json!(true)));
    assert_eq!(
        engine.executor().called_steps(),
        vec!["collect", "lint", "publish"]
    );
}

/// The first step gates by default
#[tokio::test]
async fn test_first_step_gates_by_default() {
    let executor = MockExecutor::new(timeline())
        .respond("collect", json!({ "success": false, "artifacts": [], "error": "no sources" }));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(THREE_STEPS), json!({})).await;

    assert_failed(&result);
    assert_eq!(result.error(), Some("no sources"));
    assert_eq!(engine.executor().called_steps(), vec!["collect"]);
}

/// `gate_all` makes every step gating, a step can still opt out
#[tokio::test]
async fn test_gate_all_with_opt_out() {
    let yaml = r#"
name: "strict"
gate_all: true
tasks:
  - name: work
    prompt:
      task: "Do the work"
steps:
  - id: one
    task: work
  - id: optional
    task: work
    gating: false
  - id: two
    task: work
  - id: three
    task: work
"#;
    let executor = MockExecutor::new(timeline())
        .respond("optional", json!({ "success": false, "artifacts": [] }))
        .respond("two", json!({ "success": false, "artifacts": [] }));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(yaml), json!({})).await;

    assert_failed(&result);
    assert_eq!(
        engine.executor().called_steps(),
        vec!["one", "optional", "two"]
    );
}

/// Executor errors fail the run with the step and error kind
#[tokio::test]
async fn test_executor_error_fails_run() {
    let executor = MockExecutor::new(timeline())
        .error("lint", || AgentError::Timeout(30));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(THREE_STEPS), json!({})).await;

    assert_failed(&result);
    assert!(result.error().unwrap().contains("Step 'lint' failed"));
    assert_eq!(
        result.details(),
        Some(&json!({ "step": "lint", "kind": "timeout" }))
    );
    assert_eq!(engine.executor().called_steps(), vec!["collect", "lint"]);
}

/// Results without `success`/`artifacts` break the contract
#[tokio::test]
async fn test_malformed_result_fails_run() {
    let executor = MockExecutor::new(timeline())
        .respond("collect", json!({ "summary": "forgot the flags" }));
    let engine = ExecutionEngine::new(executor, Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(THREE_STEPS), json!({})).await;

    assert_failed(&result);
    assert_eq!(
        result.details(),
        Some(&json!({ "step": "collect", "kind": "invalid_result" }))
    );
}
