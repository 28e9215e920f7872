//! Core domain models for taskline
//!
//! This module defines the fundamental data structures that represent
//! processes, tasks, steps, and the data a run accumulates.

pub mod artifact;
pub mod condition;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod result;
pub mod state;
pub mod step;
pub mod task;

pub use artifact::*;
pub use context::*;
pub use pipeline::*;
pub use result::*;
pub use state::*;
pub use step::*;
pub use task::*;
