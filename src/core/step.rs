//! Step domain model

use crate::core::{
    condition::StepCondition,
    config::{BreakpointConfig, StepConfig},
    context::lookup,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a step input value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// `$inputs` or `$inputs.<path>`
    Inputs(String),
    /// `$steps.<id>` or `$steps.<id>.<path>`
    Step { id: String, path: String },
    /// `$artifacts` - everything collected so far
    Artifacts,
    /// Any other value, used as written
    Literal(Value),
}

impl Binding {
    /// Parse a binding from its YAML value
    pub fn parse(value: &Value) -> Result<Self, String> {
        let Some(expr) = value.as_str().filter(|s| s.starts_with('$')) else {
            return Ok(Binding::Literal(value.clone()));
        };

        if expr == "$artifacts" {
            return Ok(Binding::Artifacts);
        }
        if expr == "$inputs" {
            return Ok(Binding::Inputs(String::new()));
        }
        if let Some(path) = expr.strip_prefix("$inputs.") {
            return Ok(Binding::Inputs(path.to_string()));
        }
        if let Some(rest) = expr.strip_prefix("$steps.") {
            let mut parts = rest.splitn(2, '.');
            let id = parts.next().unwrap_or_default();
            if id.is_empty() {
                return Err(format!("Binding '{}' is missing a step id", expr));
            }
            return Ok(Binding::Step {
                id: id.to_string(),
                path: parts.next().unwrap_or_default().to_string(),
            });
        }

        Err(format!(
            "Unknown binding '{}' (expected $inputs, $steps.<id> or $artifacts)",
            expr
        ))
    }

    /// The step this binding reads from, if any
    pub fn referenced_step(&self) -> Option<&str> {
        match self {
            Binding::Step { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Resolve against a run scope; unresolvable references become `null`
    pub fn resolve(&self, scope: &Value) -> Value {
        let found = match self {
            Binding::Inputs(path) => scope.get("inputs").and_then(|inputs| lookup(inputs, path)),
            Binding::Step { id, path } => scope
                .get("steps")
                .and_then(|steps| steps.get(id))
                .and_then(|result| lookup(result, path)),
            Binding::Artifacts => scope.get("artifacts"),
            Binding::Literal(value) => Some(value),
        };
        found.cloned().unwrap_or(Value::Null)
    }
}

/// Parse a key -> binding map
pub fn parse_bindings(raw: &BTreeMap<String, Value>) -> Result<Vec<(String, Binding)>, String> {
    raw.iter()
        .map(|(key, value)| {
            Binding::parse(value)
                .map(|binding| (key.clone(), binding))
                .map_err(|e| format!("{}: {}", key, e))
        })
        .collect()
}

/// Resolve a list of bindings into a JSON object
pub fn resolve_bindings(bindings: &[(String, Binding)], scope: &Value) -> Map<String, Value> {
    bindings
        .iter()
        .map(|(key, binding)| (key.clone(), binding.resolve(scope)))
        .collect()
}

/// How a step's input object is computed
#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    /// Start from the original run inputs
    pub inherit_inputs: bool,

    /// Explicit key bindings, applied over the inherited inputs
    pub bindings: Vec<(String, Binding)>,
}

impl InputBinding {
    /// Compute the step input from the run scope
    pub fn compute(&self, scope: &Value) -> Value {
        let mut input = if self.inherit_inputs {
            scope
                .get("inputs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        } else {
            Map::new()
        };

        input.extend(resolve_bindings(&self.bindings, scope));
        Value::Object(input)
    }
}

/// Whether a breakpoint sits before or after its step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointPosition {
    Before,
    #[default]
    After,
}

/// What an unanswered breakpoint resolves to once its timeout expires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    Approve,
    #[default]
    Reject,
}

/// A human checkpoint attached to a step
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSpec {
    pub title: String,
    pub question: String,
    pub position: BreakpointPosition,

    /// Summary fields shown to the reviewer
    pub summary: Vec<(String, Binding)>,

    /// Resolve automatically after this many seconds
    pub timeout_secs: Option<u64>,
    pub on_timeout: TimeoutAction,
}

impl BreakpointSpec {
    pub fn from_config(config: &BreakpointConfig) -> Result<Self, String> {
        Ok(Self {
            title: config.title.clone(),
            question: config.question.clone(),
            position: config.position,
            summary: parse_bindings(&config.summary)?,
            timeout_secs: config.timeout_secs,
            on_timeout: config.on_timeout,
        })
    }

    /// Summary object for the current run scope
    pub fn summary(&self, scope: &Value) -> Value {
        Value::Object(resolve_bindings(&self.summary, scope))
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Name of the task definition this step runs
    pub task: String,

    /// How the step input is computed
    pub input: InputBinding,

    /// Whether `success: false` aborts the run
    pub gating: bool,

    /// Skip the step unless this holds
    pub condition: Option<StepCondition>,

    /// Optional human checkpoint
    pub breakpoint: Option<BreakpointSpec>,

    /// Optional executor timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl Step {
    /// Create a step from a step config
    ///
    /// `gating` is resolved by the caller since it depends on the task and
    /// the step's position.
    pub fn from_config(config: &StepConfig, gating: bool) -> Result<Self, String> {
        let bindings = parse_bindings(&config.input)
            .map_err(|e| format!("Step '{}' input {}", config.id, e))?;

        let condition = config
            .when
            .as_deref()
            .map(StepCondition::parse)
            .transpose()
            .map_err(|e| format!("Step '{}': {}", config.id, e))?;

        let breakpoint = config
            .breakpoint
            .as_ref()
            .map(BreakpointSpec::from_config)
            .transpose()
            .map_err(|e| format!("Step '{}' breakpoint summary {}", config.id, e))?;

        Ok(Step {
            id: config.id.clone(),
            task: config.task.clone(),
            input: InputBinding {
                inherit_inputs: config.inherit_inputs,
                bindings,
            },
            gating,
            condition,
            breakpoint,
            timeout_secs: config.timeout_secs,
        })
    }

    /// The breakpoint at a given position, if any
    pub fn breakpoint_at(&self, position: BreakpointPosition) -> Option<&BreakpointSpec> {
        self.breakpoint.as_ref().filter(|bp| bp.position == position)
    }

    /// Step ids read by the input bindings and the condition
    pub fn referenced_steps(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self
            .input
            .bindings
            .iter()
            .filter_map(|(_, b)| b.referenced_step())
            .collect();
        if let Some(condition) = &self.condition {
            refs.extend(condition.referenced_step());
        }
        refs
    }
}
