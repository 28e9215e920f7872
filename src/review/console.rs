//! Interactive console reviewer

use crate::review::{Breakpoint, ReviewDecision, ReviewError, ReviewGate};
use async_trait::async_trait;
use console::{style, Term};

/// Asks the reviewer on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReviewer;

impl ConsoleReviewer {
    pub fn new() -> Self {
        Self
    }

    fn prompt(term: &Term, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError> {
        term.write_line("")?;
        term.write_line(&format!(
            "{} {}",
            style("⏸  Breakpoint:").yellow().bold(),
            style(&breakpoint.title).bold()
        ))?;
        term.write_line(&format!("   {}", breakpoint.question))?;

        if !breakpoint.context.files.is_empty() {
            term.write_line(&format!("   {}", style("Files:").dim()))?;
            for file in &breakpoint.context.files {
                let format = file.format.as_deref().unwrap_or("-");
                term.write_line(&format!("     {} ({})", file.path, style(format).dim()))?;
            }
        }

        if breakpoint.context.summary.as_object().is_some_and(|s| !s.is_empty()) {
            let summary = serde_json::to_string_pretty(&breakpoint.context.summary)
                .map_err(|e| ReviewError::Internal(e.to_string()))?;
            term.write_line(&format!("   {}", style("Summary:").dim()))?;
            for line in summary.lines() {
                term.write_line(&format!("     {}", line))?;
            }
        }

        loop {
            term.write_str(&format!(
                "   {} ",
                style("[a]pprove / [r]eject / [d]efer >").cyan()
            ))?;
            let answer = term.read_line()?;
            match parse_answer(&answer) {
                Some(ReviewDecision::Rejected { .. }) => {
                    term.write_str("   Reason (optional): ")?;
                    let reason = term.read_line()?;
                    let reason = reason.trim();
                    return Ok(ReviewDecision::Rejected {
                        reason: (!reason.is_empty()).then(|| reason.to_string()),
                    });
                }
                Some(decision) => return Ok(decision),
                None => term.write_line(&format!("   {}", style("Please answer a, r or d").red()))?,
            }
        }
    }
}

/// Map a typed answer to a decision
fn parse_answer(answer: &str) -> Option<ReviewDecision> {
    match answer.trim().to_lowercase().as_str() {
        "a" | "approve" | "y" | "yes" => Some(ReviewDecision::Approved),
        "r" | "reject" | "n" | "no" => Some(ReviewDecision::Rejected { reason: None }),
        "d" | "defer" => Some(ReviewDecision::Deferred),
        _ => None,
    }
}

#[async_trait]
impl ReviewGate for ConsoleReviewer {
    async fn review(&self, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError> {
        let breakpoint = breakpoint.clone();
        // Terminal reads block, keep them off the runtime threads
        tokio::task::spawn_blocking(move || Self::prompt(&Term::stderr(), &breakpoint))
            .await
            .map_err(|_| ReviewError::Interrupted)?
    }
}
