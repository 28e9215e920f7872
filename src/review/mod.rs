//! Review gates - human checkpoints between steps
//!
//! When a step declares a breakpoint the runner builds a [`Breakpoint`]
//! payload and hands it to the configured [`ReviewGate`]. The gate either
//! decides on the spot or defers, in which case the run is suspended and can
//! be resumed later with an explicit decision.

pub mod console;

pub use console::ConsoleReviewer;

use crate::core::FileRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Context shown to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointContext {
    pub run_id: Uuid,

    /// Artifacts produced so far
    pub files: Vec<FileRef>,

    /// Step-declared summary fields
    pub summary: Value,
}

/// Payload of a raised breakpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub question: String,
    pub title: String,
    pub context: BreakpointContext,
}

/// Resolution of a breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum ReviewDecision {
    /// Continue with the next step
    Approved,
    /// Stop the run
    Rejected { reason: Option<String> },
    /// Park the run until someone decides
    Deferred,
}

impl ReviewDecision {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ReviewDecision::Rejected {
            reason: Some(reason.into()),
        }
    }
}

/// Error types for review gates
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("I/O error while waiting for review: {0}")]
    Io(#[from] std::io::Error),

    #[error("Review interrupted")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for resolving breakpoints
#[async_trait]
pub trait ReviewGate: Send + Sync {
    async fn review(&self, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError>;
}

/// Approves every breakpoint without asking
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ReviewGate for AutoApprove {
    async fn review(&self, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError> {
        tracing::info!("Auto-approving breakpoint '{}'", breakpoint.title);
        Ok(ReviewDecision::Approved)
    }
}

/// Defers every breakpoint so the run is suspended for a later `resume`
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferReview;

#[async_trait]
impl ReviewGate for DeferReview {
    async fn review(&self, breakpoint: &Breakpoint) -> Result<ReviewDecision, ReviewError> {
        tracing::info!("Deferring breakpoint '{}'", breakpoint.title);
        Ok(ReviewDecision::Deferred)
    }
}
