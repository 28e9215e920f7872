//! Test: Suspend/Resume - deferred breakpoints park the run in the store

use crate::helpers::*;
use serde_json::json;
use std::sync::Arc;
use taskline::persistence::{InMemoryPersistence, PersistenceBackend};
use taskline::review::{AutoApprove, DeferReview, ReviewDecision};
use taskline::{ExecutionEngine, RunError, RunOutcome, RunStatus};

const PROCESS: &str = r#"
name: "grant-proposal"
tasks:
  - name: draft
    prompt:
      task: "Draft the proposal for {{ inputs.agency }}"
  - name: budget
    prompt:
      task: "Prepare the budget"
  - name: submit
    prompt:
      task: "Assemble the submission"
steps:
  - id: draft
    task: draft
    breakpoint:
      title: "Draft review"
      question: "Is the narrative ready?"
  - id: budget
    task: budget
    breakpoint:
      title: "Budget approval"
      question: "May we spend this much?"
      position: before
  - id: submit
    task: submit
"#;

fn executor(timeline: Timeline) -> MockExecutor {
    MockExecutor::new(timeline)
        .respond("draft", ok(&["narrative.md"], json!({ "pages": 12 })))
        .respond("budget", ok(&["budget.xlsx"], json!({ "total": 250000 })))
        .respond("submit", ok(&["submission.pdf"], json!({ "submitted": true })))
}

fn deferring_engine<S: PersistenceBackend + 'static>(
    store: &Arc<S>,
) -> ExecutionEngine<MockExecutor> {
    ExecutionEngine::new(executor(timeline()), Arc::new(DeferReview)).with_store(store.clone())
}

fn approving_engine<S: PersistenceBackend + 'static>(
    store: &Arc<S>,
) -> ExecutionEngine<MockExecutor> {
    ExecutionEngine::new(executor(timeline()), Arc::new(AutoApprove)).with_store(store.clone())
}

/// Start a run and return the id it was suspended under
async fn suspend_at_draft<S: PersistenceBackend + 'static>(store: &Arc<S>) -> uuid::Uuid {
    let engine = deferring_engine(store);
    let outcome = engine
        .run(&pipeline(PROCESS), json!({ "agency": "NSF" }))
        .await
        .unwrap();

    let RunOutcome::Suspended {
        run_id,
        step_id,
        breakpoint,
    } = outcome
    else {
        panic!("expected the run to suspend");
    };
    assert_eq!(step_id, "draft");
    assert_eq!(breakpoint.title, "Draft review");
    run_id
}

/// A deferred breakpoint persists the run and its history entry
#[tokio::test]
async fn test_defer_suspends_run() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;

    let pending = store.list_suspended().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].run_id, run_id);
    assert_eq!(pending[0].process_id, "grant-proposal");
    assert_eq!(pending[0].step_index, 0);
    assert_eq!(pending[0].data.artifacts.len(), 1);

    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Suspended);
    assert_eq!(summary.executed_steps, 1);
}

/// Approving resumes after the breakpoint with the accumulated data
#[tokio::test]
async fn test_resume_with_approval_completes() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;

    // The `before` breakpoint of `budget` defers again
    let engine = deferring_engine(&store);
    let outcome = engine
        .resume(&pipeline(PROCESS), run_id, ReviewDecision::Approved)
        .await
        .unwrap();
    let RunOutcome::Suspended { step_id, .. } = &outcome else {
        panic!("expected a second suspension");
    };
    assert_eq!(step_id, "budget");
    assert!(engine.executor().calls().is_empty());

    // Approving the `before` breakpoint runs the step without asking again
    let engine = deferring_engine(&store);
    let result = engine
        .resume(&pipeline(PROCESS), run_id, ReviewDecision::Approved)
        .await
        .unwrap()
        .into_result()
        .expect("run should finish");

    assert_succeeded(&result);
    assert_eq!(result.metadata().run_id, run_id);
    assert_eq!(
        artifact_paths(&result),
        vec!["narrative.md", "budget.xlsx", "submission.pdf"]
    );
    assert_eq!(result.field("submitted"), Some(&json!(true)));
    assert_eq!(engine.executor().called_steps(), vec!["budget", "submit"]);

    assert!(store.list_suspended().await.unwrap().is_empty());
    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.executed_steps, 3);
    assert_eq!(summary.artifact_count, 3);
}

/// Later steps see results recorded before the suspension
#[tokio::test]
async fn test_resumed_steps_see_earlier_results() {
    let yaml = PROCESS.replace(
        "  - id: submit\n    task: submit\n",
        "  - id: submit\n    task: submit\n    input:\n      pages: \"$steps.draft.pages\"\n",
    );
    let store = Arc::new(InMemoryPersistence::new());
    let engine = ExecutionEngine::new(executor(timeline()), Arc::new(DeferReview))
        .with_store(store.clone());
    let run_id = engine
        .run(&pipeline(&yaml), json!({ "agency": "NSF" }))
        .await
        .unwrap()
        .run_id();

    let engine = deferring_engine(&store);
    engine
        .resume(&pipeline(&yaml), run_id, ReviewDecision::Approved)
        .await
        .unwrap();
    engine
        .resume(&pipeline(&yaml), run_id, ReviewDecision::Approved)
        .await
        .unwrap();

    let submit = engine.executor().call("submit");
    assert_eq!(submit.input["pages"], json!(12));
    assert_eq!(submit.input["agency"], json!("NSF"));
}

/// Rejecting a suspended run produces the failure form
#[tokio::test]
async fn test_resume_with_rejection_fails() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;

    let engine = deferring_engine(&store);
    let result = engine
        .resume(
            &pipeline(PROCESS),
            run_id,
            ReviewDecision::rejected("too long"),
        )
        .await
        .unwrap()
        .into_result()
        .expect("run should finish");

    assert_failed(&result);
    assert_eq!(result.error(), Some("Rejected at breakpoint 'Draft review'"));
    assert_eq!(result.details().unwrap()["reason"], json!("too long"));
    assert!(engine.executor().calls().is_empty());

    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert!(store.load_suspended(run_id).await.unwrap().is_none());
}

/// Deferring again leaves the suspended run untouched
#[tokio::test]
async fn test_resume_with_deferral_keeps_record() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;
    let before = store.load_suspended(run_id).await.unwrap().unwrap();

    let outcome = deferring_engine(&store)
        .resume(&pipeline(PROCESS), run_id, ReviewDecision::Deferred)
        .await
        .unwrap();

    assert!(outcome.is_suspended());
    let after = store.load_suspended(run_id).await.unwrap().unwrap();
    assert_eq!(after.suspended_at, before.suspended_at);
}

/// Cancelling drops the suspended run and records it as cancelled
#[tokio::test]
async fn test_cancel_suspended_run() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;

    let engine = deferring_engine(&store);
    engine.cancel(run_id).await.unwrap();

    assert!(store.list_suspended().await.unwrap().is_empty());
    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert!(summary.completed_at.is_some());

    let err = engine
        .resume(&pipeline(PROCESS), run_id, ReviewDecision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::NotSuspended(id) if id == run_id));
}

/// Two resumes racing for the same run: one runs the steps, the other is turned away
#[tokio::test]
async fn test_concurrent_resumes_run_steps_once() {
    let store = Arc::new(YieldingStore::new());
    let run_id = suspend_at_draft(&store).await;

    let first = approving_engine(&store);
    let second = approving_engine(&store);
    let process = pipeline(PROCESS);
    let (a, b) = tokio::join!(
        first.resume(&process, run_id, ReviewDecision::Approved),
        second.resume(&process, run_id, ReviewDecision::Approved),
    );

    let (won, lost) = match (a, b) {
        (Ok(outcome), Err(err)) | (Err(err), Ok(outcome)) => (outcome, err),
        (a, b) => panic!("expected exactly one resume to win, got {:?} and {:?}", a, b),
    };
    assert!(matches!(lost, RunError::NotSuspended(id) if id == run_id));
    assert_succeeded(&won.into_result().expect("run should finish"));

    let budget_calls = [&first, &second]
        .iter()
        .flat_map(|engine| engine.executor().called_steps())
        .filter(|step| step == "budget")
        .count();
    assert_eq!(budget_calls, 1);

    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.executed_steps, 3);
}

/// A resume racing a cancel: exactly one of them takes the run
#[tokio::test]
async fn test_resume_racing_cancel_claims_once() {
    let store = Arc::new(YieldingStore::new());
    let run_id = suspend_at_draft(&store).await;

    let resumer = approving_engine(&store);
    let canceller = approving_engine(&store);
    let process = pipeline(PROCESS);
    let (resumed, cancelled) = tokio::join!(
        resumer.resume(&process, run_id, ReviewDecision::Approved),
        canceller.cancel(run_id),
    );

    let summary = store.load_execution(run_id).await.unwrap().unwrap();
    match (resumed, cancelled) {
        (Ok(outcome), Err(err)) => {
            assert!(matches!(err, RunError::NotSuspended(id) if id == run_id));
            assert_succeeded(&outcome.into_result().expect("run should finish"));
            assert_eq!(resumer.executor().called_steps(), vec!["budget", "submit"]);
            assert_eq!(summary.status, RunStatus::Completed);
        }
        (Err(err), Ok(())) => {
            assert!(matches!(err, RunError::NotSuspended(id) if id == run_id));
            assert!(resumer.executor().calls().is_empty());
            assert_eq!(summary.status, RunStatus::Cancelled);
        }
        (a, b) => panic!("expected exactly one winner, got {:?} and {:?}", a, b),
    }
    assert!(store.list_suspended().await.unwrap().is_empty());
}

/// A run can only be resumed with the process it was started from
#[tokio::test]
async fn test_resume_with_other_process_fails() {
    let store = Arc::new(InMemoryPersistence::new());
    let run_id = suspend_at_draft(&store).await;
    let other = PROCESS.replace("grant-proposal", "other-proposal");

    let err = deferring_engine(&store)
        .resume(&pipeline(&other), run_id, ReviewDecision::Approved)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::ProcessMismatch { .. }));
    assert!(store.load_suspended(run_id).await.unwrap().is_some());
}

/// Resume and cancel need a store
#[tokio::test]
async fn test_resume_without_store() {
    let engine = ExecutionEngine::new(executor(timeline()), Arc::new(DeferReview));

    let err = engine
        .resume(&pipeline(PROCESS), uuid::Uuid::new_v4(), ReviewDecision::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::NoStore));
    assert!(matches!(
        engine.cancel(uuid::Uuid::new_v4()).await.unwrap_err(),
        RunError::NoStore
    ));
}
