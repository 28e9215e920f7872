//! Main execution engine - orchestrates a run of a pipeline
//!
//! Steps run strictly in order. For each step the engine evaluates its
//! condition, raises its `before` breakpoint, computes the input, calls the
//! task executor, accumulates artifacts, applies the gating check, records
//! the result and raises its `after` breakpoint.

use crate::{
    agent::TaskExecutor,
    core::{
        domain_fields, BreakpointPosition, BreakpointSpec, CancellationFlag, Pipeline, RunContext,
        RunResult, RunState, RunStatus, Step, TimeoutAction,
    },
    execution::{ExecutionResult, StepExecutor},
    persistence::{ExecutionSummary, PersistenceBackend, SuspendedRun},
    review::{Breakpoint, BreakpointContext, ReviewDecision, ReviewError, ReviewGate},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        process: String,
        total_steps: usize,
    },
    RunResumed {
        run_id: Uuid,
        step_id: String,
    },
    StepStarted {
        run_id: Uuid,
        step_id: String,
        index: usize,
        effect_id: Uuid,
    },
    StepSkipped {
        run_id: Uuid,
        step_id: String,
        condition: String,
    },
    StepCompleted {
        run_id: Uuid,
        step_id: String,
        success: bool,
        artifacts: usize,
    },
    StepFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
    },
    BreakpointRaised {
        run_id: Uuid,
        step_id: String,
        breakpoint: Breakpoint,
    },
    BreakpointResolved {
        run_id: Uuid,
        step_id: String,
        decision: ReviewDecision,
        timed_out: bool,
    },
    RunSuspended {
        run_id: Uuid,
        step_id: String,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
        duration_ms: u64,
    },
}

impl ExecutionEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            ExecutionEvent::RunStarted { run_id, .. }
            | ExecutionEvent::RunResumed { run_id, .. }
            | ExecutionEvent::StepStarted { run_id, .. }
            | ExecutionEvent::StepSkipped { run_id, .. }
            | ExecutionEvent::StepCompleted { run_id, .. }
            | ExecutionEvent::StepFailed { run_id, .. }
            | ExecutionEvent::BreakpointRaised { run_id, .. }
            | ExecutionEvent::BreakpointResolved { run_id, .. }
            | ExecutionEvent::RunSuspended { run_id, .. }
            | ExecutionEvent::RunFinished { run_id, .. } => *run_id,
        }
    }

    /// Snake-case event name, as written to the journal
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::RunStarted { .. } => "run_started",
            ExecutionEvent::RunResumed { .. } => "run_resumed",
            ExecutionEvent::StepStarted { .. } => "step_started",
            ExecutionEvent::StepSkipped { .. } => "step_skipped",
            ExecutionEvent::StepCompleted { .. } => "step_completed",
            ExecutionEvent::StepFailed { .. } => "step_failed",
            ExecutionEvent::BreakpointRaised { .. } => "breakpoint_raised",
            ExecutionEvent::BreakpointResolved { .. } => "breakpoint_resolved",
            ExecutionEvent::RunSuspended { .. } => "run_suspended",
            ExecutionEvent::RunFinished { .. } => "run_finished",
        }
    }

    /// Run status implied by the event, if it changes it
    pub fn status(&self) -> Option<RunStatus> {
        match self {
            ExecutionEvent::RunStarted { .. } | ExecutionEvent::RunResumed { .. } => {
                Some(RunStatus::Running)
            }
            ExecutionEvent::BreakpointRaised { .. } => Some(RunStatus::AwaitingReview),
            ExecutionEvent::BreakpointResolved { .. } => Some(RunStatus::Running),
            ExecutionEvent::RunSuspended { .. } => Some(RunStatus::Suspended),
            ExecutionEvent::RunFinished { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// How a call to [`ExecutionEngine::run`] or [`ExecutionEngine::resume`] ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached a final result (success or failure form)
    Finished(RunResult),
    /// The run is parked at a deferred breakpoint
    Suspended {
        run_id: Uuid,
        step_id: String,
        breakpoint: Breakpoint,
    },
}

impl RunOutcome {
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            RunOutcome::Finished(result) => Some(result),
            RunOutcome::Suspended { .. } => None,
        }
    }

    pub fn into_result(self) -> Option<RunResult> {
        match self {
            RunOutcome::Finished(result) => Some(result),
            RunOutcome::Suspended { .. } => None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended { .. })
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            RunOutcome::Finished(result) => result.metadata().run_id,
            RunOutcome::Suspended { run_id, .. } => *run_id,
        }
    }
}

/// Errors that abort a run without a result
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run {run_id} was cancelled")]
    Cancelled { run_id: Uuid },

    #[error("Invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("Review failed: {0}")]
    Review(#[from] ReviewError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Step '{step_id}' references unknown task '{task}'")]
    UnknownTask { step_id: String, task: String },

    #[error("Breakpoint at step '{step_id}' was deferred but no store is configured")]
    DeferWithoutStore { step_id: String },

    #[error("No persistence store configured")]
    NoStore,

    #[error("No suspended run with id {0}")]
    NotSuspended(Uuid),

    #[error("Suspended run belongs to '{found}', not '{expected}'")]
    ProcessMismatch { expected: String, found: String },
}

fn persistence(err: anyhow::Error) -> RunError {
    RunError::Persistence(format!("{:#}", err))
}

/// Where to (re)start the step loop
#[derive(Debug, Clone, Copy)]
struct Cursor {
    index: usize,
    /// The `before` breakpoint of `index` was already resolved
    skip_before: bool,
}

/// Main pipeline execution engine
pub struct ExecutionEngine<E> {
    executor: StepExecutor<E>,
    reviewer: Arc<dyn ReviewGate>,
    store: Option<Arc<dyn PersistenceBackend>>,
    event_handlers: Vec<EventHandler>,
    cancellation: CancellationFlag,
}

impl<E: TaskExecutor> ExecutionEngine<E> {
    pub fn new(executor: E, reviewer: Arc<dyn ReviewGate>) -> Self {
        Self {
            executor: StepExecutor::new(executor),
            reviewer,
            store: None,
            event_handlers: Vec::new(),
            cancellation: CancellationFlag::new(),
        }
    }

    /// Record history and suspended runs in `store`
    pub fn with_store(mut self, store: Arc<dyn PersistenceBackend>) -> Self {
        self.store = Some(store);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    /// Flag that cancels in-flight runs of this engine when set
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn executor(&self) -> &E {
        self.executor.executor()
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Run a pipeline from the first step
    pub async fn run(&self, pipeline: &Pipeline, inputs: Value) -> Result<RunOutcome, RunError> {
        let inputs = pipeline
            .prepare_inputs(inputs)
            .map_err(RunError::InvalidInputs)?;
        let mut ctx = RunContext::new(&pipeline.name, pipeline.version.clone(), inputs)
            .with_cancellation(self.cancellation.clone());
        let mut state = RunState::new(ctx.run_id, pipeline.len());
        state.start(ctx.started_at);

        ctx.log(&format!("Starting run of {} ({} steps)", pipeline.name, pipeline.len()));
        self.emit_event(ExecutionEvent::RunStarted {
            run_id: ctx.run_id,
            process: pipeline.name.clone(),
            total_steps: pipeline.len(),
        });

        let cursor = Cursor {
            index: 0,
            skip_before: false,
        };
        self.drive_and_settle(pipeline, &mut ctx, &mut state, cursor)
            .await
    }

    /// Resume a run suspended at a deferred breakpoint with a decision
    pub async fn resume(
        &self,
        pipeline: &Pipeline,
        run_id: Uuid,
        decision: ReviewDecision,
    ) -> Result<RunOutcome, RunError> {
        let store = self.require_store()?;
        let suspended = store
            .load_suspended(run_id)
            .await
            .map_err(persistence)?
            .ok_or(RunError::NotSuspended(run_id))?;

        if suspended.process_id != pipeline.name {
            return Err(RunError::ProcessMismatch {
                expected: pipeline.name.clone(),
                found: suspended.process_id,
            });
        }
        let step = pipeline
            .steps
            .get(suspended.step_index)
            .filter(|step| step.id == suspended.step_id)
            .ok_or_else(|| RunError::ProcessMismatch {
                expected: format!("{} with step '{}'", pipeline.name, suspended.step_id),
                found: suspended.process_id.clone(),
            })?;

        // Another deferral keeps the record untouched
        if decision == ReviewDecision::Deferred {
            info!("Run {} stays suspended at step {}", run_id, step.id);
            return Ok(RunOutcome::Suspended {
                run_id,
                step_id: suspended.step_id,
                breakpoint: suspended.breakpoint,
            });
        }

        // Deleting the record claims the run; a concurrent resume or cancel loses
        if !store.delete_suspended(run_id).await.map_err(persistence)? {
            warn!("Run {} was claimed by another resume or cancel", run_id);
            return Err(RunError::NotSuspended(run_id));
        }

        let mut ctx = RunContext::restore(
            run_id,
            suspended.process_id,
            suspended.version,
            suspended.started_at,
            suspended.data,
        )
        .with_cancellation(self.cancellation.clone());
        let mut state = RunState::new(run_id, pipeline.len());
        state.start(ctx.started_at);
        state.executed_steps = ctx.data.executed.len();
        state.skipped_steps = ctx.data.skipped.len();
        state.enter_step(suspended.step_index);

        ctx.log(&format!("Resuming at step {} with {:?}", step.id, decision));
        self.emit_event(ExecutionEvent::RunResumed {
            run_id,
            step_id: step.id.clone(),
        });
        self.emit_event(ExecutionEvent::BreakpointResolved {
            run_id,
            step_id: step.id.clone(),
            decision: decision.clone(),
            timed_out: false,
        });

        if let ReviewDecision::Rejected { reason } = decision {
            let outcome = self
                .reject(&ctx, &mut state, step, &suspended.breakpoint.title, reason)
                .await;
            return Ok(outcome);
        }

        let cursor = match suspended.position {
            BreakpointPosition::Before => Cursor {
                index: suspended.step_index,
                skip_before: true,
            },
            BreakpointPosition::After => Cursor {
                index: suspended.step_index + 1,
                skip_before: false,
            },
        };
        self.drive_and_settle(pipeline, &mut ctx, &mut state, cursor)
            .await
    }

    /// Cancel a suspended run
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), RunError> {
        let store = self.require_store()?;
        let suspended = store
            .load_suspended(run_id)
            .await
            .map_err(persistence)?
            .ok_or(RunError::NotSuspended(run_id))?;
        if !store.delete_suspended(run_id).await.map_err(persistence)? {
            warn!("Run {} was claimed by another resume or cancel", run_id);
            return Err(RunError::NotSuspended(run_id));
        }

        // The summary written at suspension time carries the step counts
        let mut summary = match store.load_execution(run_id).await.map_err(persistence)? {
            Some(summary) => summary,
            None => {
                let ctx = RunContext::restore(
                    run_id,
                    suspended.process_id.clone(),
                    suspended.version.clone(),
                    suspended.started_at,
                    suspended.data.clone(),
                );
                let mut state = RunState::new(run_id, suspended.step_index + 1);
                state.executed_steps = ctx.data.executed.len();
                state.skipped_steps = ctx.data.skipped.len();
                ExecutionSummary::from_run(&ctx, &state, None)
            }
        };
        let now = Utc::now();
        summary.status = RunStatus::Cancelled;
        summary.completed_at = Some(now);
        summary.error = Some(format!("Cancelled at breakpoint '{}'", suspended.breakpoint.title));
        store.save_execution(&summary).await.map_err(persistence)?;

        info!("Suspended run {} cancelled", run_id);
        self.emit_event(ExecutionEvent::RunFinished {
            run_id,
            status: RunStatus::Cancelled,
            duration_ms: (now - suspended.started_at).num_milliseconds().max(0) as u64,
        });
        Ok(())
    }

    fn require_store(&self) -> Result<&Arc<dyn PersistenceBackend>, RunError> {
        self.store.as_ref().ok_or(RunError::NoStore)
    }

    /// Drive the loop and record history for runs that abort with an error
    async fn drive_and_settle(
        &self,
        pipeline: &Pipeline,
        ctx: &mut RunContext,
        state: &mut RunState,
        cursor: Cursor,
    ) -> Result<RunOutcome, RunError> {
        let outcome = self.drive(pipeline, ctx, state, cursor).await;

        if let Err(err) = &outcome {
            match err {
                RunError::Cancelled { .. } => state.cancel(),
                _ => state.fail(),
            }
            error!("Run {} aborted: {}", ctx.run_id, err);
            self.finish(ctx, state, Some(err.to_string())).await;
        }

        outcome
    }

    async fn drive(
        &self,
        pipeline: &Pipeline,
        ctx: &mut RunContext,
        state: &mut RunState,
        cursor: Cursor,
    ) -> Result<RunOutcome, RunError> {
        for (index, step) in pipeline.steps.iter().enumerate().skip(cursor.index) {
            self.check_cancelled(ctx)?;
            state.enter_step(index);

            if let Some(condition) = &step.condition {
                if !condition.evaluate(&ctx.scope()) {
                    info!("Skipping step {} ({} is false)", step.id, condition);
                    ctx.data.skip(&step.id);
                    state.skipped_steps += 1;
                    self.emit_event(ExecutionEvent::StepSkipped {
                        run_id: ctx.run_id,
                        step_id: step.id.clone(),
                        condition: condition.to_string(),
                    });
                    continue;
                }
            }

            let before_resolved = index == cursor.index && cursor.skip_before;
            if !before_resolved {
                if let Some(spec) = step.breakpoint_at(BreakpointPosition::Before) {
                    if let Some(outcome) = self.checkpoint(ctx, state, index, step, spec).await? {
                        return Ok(outcome);
                    }
                }
            }

            let task = pipeline
                .task_for(step)
                .ok_or_else(|| RunError::UnknownTask {
                    step_id: step.id.clone(),
                    task: step.task.clone(),
                })?;
            let input = step.input.compute(&ctx.scope());
            let request = self.executor.prepare(ctx, step, task, input);

            self.emit_event(ExecutionEvent::StepStarted {
                run_id: ctx.run_id,
                step_id: step.id.clone(),
                index,
                effect_id: request.effect_id,
            });

            let result = match self.executor.execute(&request, step.timeout_secs).await {
                ExecutionResult::Completed(result) => result,
                ExecutionResult::Failed { error, kind } => {
                    self.emit_event(ExecutionEvent::StepFailed {
                        run_id: ctx.run_id,
                        step_id: step.id.clone(),
                        error: error.clone(),
                    });
                    let message = format!("Step '{}' failed: {}", step.id, error);
                    let details = json!({ "step": step.id, "kind": kind });
                    return Ok(self.fail(ctx, state, message, details).await);
                }
            };

            state.executed_steps += 1;
            self.emit_event(ExecutionEvent::StepCompleted {
                run_id: ctx.run_id,
                step_id: step.id.clone(),
                success: result.success,
                artifacts: result.artifacts.len(),
            });

            if step.gating && !result.success {
                ctx.data.artifacts.extend_from(&result.artifacts);
                let message = result
                    .value
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Gating step '{}' reported failure", step.id));
                warn!("Gating step {} failed, stopping run {}", step.id, ctx.run_id);
                return Ok(self.fail(ctx, state, message, result.value).await);
            }

            if !result.success {
                warn!("Step {} reported failure; continuing (not gating)", step.id);
            }
            ctx.data.record(&step.id, result.value, &result.artifacts);

            if let Some(spec) = step.breakpoint_at(BreakpointPosition::After) {
                if let Some(outcome) = self.checkpoint(ctx, state, index, step, spec).await? {
                    return Ok(outcome);
                }
            }
        }

        Ok(self.succeed(pipeline, ctx, state).await)
    }

    fn check_cancelled(&self, ctx: &RunContext) -> Result<(), RunError> {
        if ctx.is_cancelled() {
            warn!("Run {} cancelled", ctx.run_id);
            return Err(RunError::Cancelled { run_id: ctx.run_id });
        }
        Ok(())
    }

    /// Raise a breakpoint; `Some` stops the loop with that outcome
    async fn checkpoint(
        &self,
        ctx: &mut RunContext,
        state: &mut RunState,
        index: usize,
        step: &Step,
        spec: &BreakpointSpec,
    ) -> Result<Option<RunOutcome>, RunError> {
        self.check_cancelled(ctx)?;

        let breakpoint = Breakpoint {
            question: spec.question.clone(),
            title: spec.title.clone(),
            context: BreakpointContext {
                run_id: ctx.run_id,
                files: ctx.data.artifacts.file_refs(),
                summary: spec.summary(&ctx.scope()),
            },
        };

        state.await_review();
        info!("Breakpoint '{}' at step {}", spec.title, step.id);
        self.emit_event(ExecutionEvent::BreakpointRaised {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            breakpoint: breakpoint.clone(),
        });

        let (decision, timed_out) = match spec.timeout_secs {
            Some(secs) => {
                match timeout(Duration::from_secs(secs), self.reviewer.review(&breakpoint)).await {
                    Ok(decision) => (decision?, false),
                    Err(_) => {
                        warn!(
                            "Breakpoint '{}' unanswered after {}s, applying {:?}",
                            spec.title, secs, spec.on_timeout
                        );
                        let decision = match spec.on_timeout {
                            TimeoutAction::Approve => ReviewDecision::Approved,
                            TimeoutAction::Reject => {
                                ReviewDecision::rejected(format!("No decision within {}s", secs))
                            }
                        };
                        (decision, true)
                    }
                }
            }
            None => (self.reviewer.review(&breakpoint).await?, false),
        };

        self.emit_event(ExecutionEvent::BreakpointResolved {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            decision: decision.clone(),
            timed_out,
        });

        match decision {
            ReviewDecision::Approved => {
                state.enter_step(index);
                Ok(None)
            }
            ReviewDecision::Rejected { reason } => Ok(Some(
                self.reject(ctx, state, step, &spec.title, reason).await,
            )),
            ReviewDecision::Deferred => {
                let outcome = self
                    .suspend(ctx, state, index, step, spec.position, breakpoint)
                    .await?;
                Ok(Some(outcome))
            }
        }
    }

    async fn suspend(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        index: usize,
        step: &Step,
        position: BreakpointPosition,
        breakpoint: Breakpoint,
    ) -> Result<RunOutcome, RunError> {
        let store = self.store.as_ref().ok_or_else(|| RunError::DeferWithoutStore {
            step_id: step.id.clone(),
        })?;
        let record = SuspendedRun {
            run_id: ctx.run_id,
            process_id: ctx.process_id.clone(),
            version: ctx.version.clone(),
            step_id: step.id.clone(),
            step_index: index,
            position,
            breakpoint: breakpoint.clone(),
            data: ctx.data.clone(),
            started_at: ctx.started_at,
            suspended_at: ctx.now(),
        };
        store.save_suspended(&record).await.map_err(persistence)?;

        state.suspend();
        ctx.log(&format!("Suspended at breakpoint '{}' (step {})", breakpoint.title, step.id));
        self.record_history(ctx, state, None).await;
        self.emit_event(ExecutionEvent::RunSuspended {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
        });

        Ok(RunOutcome::Suspended {
            run_id: ctx.run_id,
            step_id: step.id.clone(),
            breakpoint,
        })
    }

    async fn reject(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        step: &Step,
        title: &str,
        reason: Option<String>,
    ) -> RunOutcome {
        let message = format!("Rejected at breakpoint '{}'", title);
        let details = json!({
            "step": step.id,
            "title": title,
            "reason": reason,
        });
        self.fail(ctx, state, message, details).await
    }

    /// Build the failure form and finish the run
    async fn fail(
        &self,
        ctx: &RunContext,
        state: &mut RunState,
        error: String,
        details: Value,
    ) -> RunOutcome {
        state.fail();
        ctx.log(&format!("Run failed: {}", error));
        self.finish(ctx, state, Some(error.clone())).await;

        RunOutcome::Finished(RunResult::Failure {
            error,
            details,
            metadata: ctx.metadata(),
        })
    }

    /// Build the success form and finish the run
    async fn succeed(&self, pipeline: &Pipeline, ctx: &RunContext, state: &mut RunState) -> RunOutcome {
        let source = pipeline
            .output
            .from
            .as_deref()
            .or_else(|| ctx.data.last_executed());
        let fields = source
            .and_then(|id| ctx.data.result(id))
            .map(|value| domain_fields(value, pipeline.output.fields.as_deref()))
            .unwrap_or_default();

        state.complete();
        ctx.log("Run completed");
        self.finish(ctx, state, None).await;

        RunOutcome::Finished(RunResult::Success {
            fields,
            artifacts: ctx.data.artifacts.as_slice().to_vec(),
            duration_ms: ctx.elapsed_ms(),
            metadata: ctx.metadata(),
        })
    }

    async fn finish(&self, ctx: &RunContext, state: &RunState, error: Option<String>) {
        self.record_history(ctx, state, error).await;
        self.emit_event(ExecutionEvent::RunFinished {
            run_id: ctx.run_id,
            status: state.status,
            duration_ms: ctx.elapsed_ms(),
        });
    }

    async fn record_history(&self, ctx: &RunContext, state: &RunState, error: Option<String>) {
        let Some(store) = &self.store else {
            return;
        };
        let summary = ExecutionSummary::from_run(ctx, state, error);
        if let Err(e) = store.save_execution(&summary).await {
            warn!("Failed to save run {} to history: {:#}", ctx.run_id, e);
        }
    }
}
