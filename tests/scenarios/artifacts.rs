//! Test: Artifacts - accumulation order, duplicates and the success form

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use taskline::review::AutoApprove;
use taskline::ExecutionEngine;

const CHAIN: &str = r#"
name: "course-review"
tasks:
  - name: outline
    prompt:
      task: "Outline {{ inputs.course }}"
  - name: assess
    prompt:
      task: "Assess the outline"
  - name: report
    prompt:
      task: "Write the report"
steps:
  - id: a
    task: outline
  - id: b
    task: assess
  - id: c
    task: report
"#;

fn chain_executor() -> MockExecutor {
    MockExecutor::new(timeline())
        .respond("a", ok(&["a.md"], json!({ "sections": 4 })))
        .respond("b", ok(&["b.md", "shared.md"], json!({ "score": 0.7 })))
        .respond(
            "c",
            ok(&["shared.md", "c.md"], json!({ "score": 0.9, "verdict": "ready" })),
        )
}

/// Artifacts accumulate in step order and keep duplicates
#[tokio::test]
async fn test_artifacts_accumulate_in_order() {
    let engine = ExecutionEngine::new(chain_executor(), Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(CHAIN), json!({ "course": "CHEM 101" })).await;

    assert_succeeded(&result);
    assert_eq!(
        artifact_paths(&result),
        vec!["a.md", "b.md", "shared.md", "shared.md", "c.md"]
    );
    assert!(result
        .artifacts()
        .iter()
        .all(|a| a.format.as_deref() == Some("markdown")));
}

/// Domain fields come from the last executed step by default
#[tokio::test]
async fn test_success_form_uses_last_step_fields() {
    let engine = ExecutionEngine::new(chain_executor(), Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(CHAIN), json!({ "course": "CHEM 101" })).await;

    assert_eq!(result.field("score"), Some(&json!(0.9)));
    assert_eq!(result.field("verdict"), Some(&json!("ready")));
    assert_eq!(result.field("sections"), None);

    let contract = result.to_json();
    assert_eq!(contract["success"], json!(true));
    assert_eq!(contract["verdict"], json!("ready"));
    assert_eq!(contract["artifacts"].as_array().map(Vec::len), Some(5));
    assert!(contract["duration"].is_u64());
    assert_eq!(contract["metadata"]["processId"], json!("course-review"));
}

/// `output.from` and `output.fields` pick the domain fields
#[tokio::test]
async fn test_output_selection() {
    let yaml = format!(
        "{}output:\n  from: b\n  fields: [score]\n",
        CHAIN
    );
    let engine = ExecutionEngine::new(chain_executor(), Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline(&yaml), json!({ "course": "CHEM 101" })).await;

    assert_eq!(result.field("score"), Some(&json!(0.7)));
    assert_eq!(result.field("verdict"), None);
}

/// Running twice with the same inputs and results gives the same output
#[tokio::test]
async fn test_same_inputs_same_result() {
    let process = pipeline(CHAIN);
    let inputs = json!({ "course": "CHEM 101" });

    let first_engine = ExecutionEngine::new(chain_executor(), Arc::new(AutoApprove));
    let first = run_to_result(&first_engine, &process, inputs.clone()).await;
    let second_engine = ExecutionEngine::new(chain_executor(), Arc::new(AutoApprove));
    let second = run_to_result(&second_engine, &process, inputs).await;

    assert_eq!(first.artifacts(), second.artifacts());
    assert_eq!(first.field("verdict"), second.field("verdict"));
    assert_eq!(first.field("score"), second.field("score"));
    assert_ne!(first.metadata().run_id, second.metadata().run_id);
    assert_eq!(
        first_engine.executor().calls()[0].prompt,
        second_engine.executor().calls()[0].prompt
    );
}

/// A process without steps succeeds with nothing to report
#[tokio::test]
async fn test_empty_process_succeeds() {
    let engine = ExecutionEngine::new(MockExecutor::new(timeline()), Arc::new(AutoApprove));

    let result = run_to_result(&engine, &pipeline("name: \"noop\"\nsteps: []\n"), json!({})).await;

    assert_succeeded(&result);
    assert!(result.artifacts().is_empty());
    assert!(engine.executor().calls().is_empty());
}
