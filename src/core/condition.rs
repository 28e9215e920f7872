//! Step conditions on prior results

use crate::core::context::{is_truthy, lookup};
use serde_json::Value;

/// A `when:` condition: a path into the run scope, optionally negated
///
/// `steps.review.approved` runs the step when the value is truthy,
/// `!steps.review.approved` when it is falsy or missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCondition {
    pub path: String,
    pub negate: bool,
}

impl StepCondition {
    /// Parse a condition expression
    pub fn parse(expr: &str) -> Result<Self, String> {
        let trimmed = expr.trim();
        let (negate, path) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, trimmed),
        };

        if path.is_empty() {
            return Err(format!("Empty condition: '{}'", expr));
        }
        let root = path.split('.').next().unwrap_or_default();
        if !matches!(root, "inputs" | "steps" | "artifacts") {
            return Err(format!(
                "Condition '{}' must start with inputs, steps or artifacts",
                expr
            ));
        }

        Ok(Self {
            path: path.to_string(),
            negate,
        })
    }

    /// The step id the condition reads from, if it reads a step result
    pub fn referenced_step(&self) -> Option<&str> {
        let mut parts = self.path.splitn(3, '.');
        match (parts.next(), parts.next()) {
            (Some("steps"), Some(id)) => Some(id),
            _ => None,
        }
    }

    /// Evaluate against a run scope
    pub fn evaluate(&self, scope: &Value) -> bool {
        let truthy = lookup(scope, &self.path).map_or(false, is_truthy);
        truthy != self.negate
    }
}

impl std::fmt::Display for StepCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negate {
            write!(f, "!{}", self.path)
        } else {
            f.write_str(&self.path)
        }
    }
}
