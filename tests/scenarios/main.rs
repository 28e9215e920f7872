//! Scenario-based tests for taskline runs

mod helpers;

mod artifacts;
mod cancellation;
mod gating;
mod suspend_resume;
