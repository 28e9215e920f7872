//! CLI output formatting

use crate::{
    core::{RunResult, RunStatus},
    execution::ExecutionEvent,
    persistence::{ExecutionSummary, SuspendedRun},
    review::ReviewDecision,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸  ", "| ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭  ", "- ");

/// Create a progress bar over the steps of a run
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::AwaitingReview => style("AWAITING REVIEW").blue().to_string(),
        RunStatus::Suspended => style("SUSPENDED").blue().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format run summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Suspended | RunStatus::AwaitingReview => PAUSE,
        _ => INFO,
    };

    format!(
        "{} {} - {} - {} ({}/{}) - {} artifact(s)",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.process_name).bold(),
        format_status(summary.status),
        summary.executed_steps + summary.skipped_steps,
        summary.total_steps,
        style(summary.artifact_count).cyan()
    )
}

/// Format a suspended run for display
pub fn format_suspended(run: &SuspendedRun) -> String {
    format!(
        "{} {} - {} - step {} - {} ({})",
        PAUSE,
        style(run.run_id).cyan(),
        style(&run.process_id).bold(),
        style(&run.step_id).yellow(),
        run.breakpoint.title,
        style(run.suspended_at.format("%Y-%m-%d %H:%M")).dim()
    )
}

/// Format an execution event for display
///
/// Returns `None` for events that are not worth a line of output.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::RunStarted {
            run_id, process, ..
        } => format!(
            "{} Starting {} ({})",
            ROCKET,
            style(process).bold(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::RunResumed { run_id, step_id } => format!(
            "{} Resuming {} at {}",
            ROCKET,
            style(short_id(run_id)).dim(),
            style(step_id).cyan()
        ),
        ExecutionEvent::StepStarted { step_id, .. } => {
            format!("{} {}", SPINNER, style(step_id).cyan())
        }
        ExecutionEvent::StepSkipped {
            step_id, condition, ..
        } => format!(
            "{} {} (skipped: {} is false)",
            SKIP,
            style(step_id).dim(),
            condition
        ),
        ExecutionEvent::StepCompleted {
            step_id,
            success,
            artifacts,
            ..
        } => {
            if *success {
                format!(
                    "{} {} ({} artifact(s))",
                    CHECK,
                    style(step_id).green(),
                    artifacts
                )
            } else {
                format!(
                    "{} {} reported {}",
                    WARN,
                    style(step_id).yellow(),
                    style("success: false").yellow()
                )
            }
        }
        ExecutionEvent::StepFailed { step_id, error, .. } => {
            format!("{} {}: {}", CROSS, style(step_id).red(), style(error).dim())
        }
        ExecutionEvent::BreakpointRaised { breakpoint, .. } => format!(
            "{} Breakpoint: {}",
            PAUSE,
            style(&breakpoint.title).bold()
        ),
        ExecutionEvent::BreakpointResolved {
            decision, timed_out, ..
        } => {
            let decision = match decision {
                ReviewDecision::Approved => style("approved").green().to_string(),
                ReviewDecision::Rejected { .. } => style("rejected").red().to_string(),
                ReviewDecision::Deferred => style("deferred").blue().to_string(),
            };
            if *timed_out {
                format!("{} Breakpoint {} (timed out)", INFO, decision)
            } else {
                format!("{} Breakpoint {}", INFO, decision)
            }
        }
        ExecutionEvent::RunSuspended { run_id, step_id } => format!(
            "{} Run {} suspended at {}",
            PAUSE,
            style(short_id(run_id)).dim(),
            style(step_id).cyan()
        ),
        ExecutionEvent::RunFinished { .. } => return None,
    };
    Some(line)
}

/// One-line verdict for a finished run
pub fn format_result(result: &RunResult) -> String {
    let meta = result.metadata();
    match result {
        RunResult::Success {
            artifacts,
            duration_ms,
            ..
        } => format!(
            "{} {} completed {} in {} with {} artifact(s)",
            CHECK,
            style(&meta.process_id).bold(),
            style("successfully").green(),
            format_duration(std::time::Duration::from_millis(*duration_ms)),
            artifacts.len()
        ),
        RunResult::Failure { error, .. } => format!(
            "{} {} {}: {}",
            CROSS,
            style(&meta.process_id).bold(),
            style("failed").red(),
            error
        ),
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
