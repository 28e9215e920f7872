//! Process configuration from YAML

use crate::core::{
    step::{BreakpointPosition, Step, TimeoutAction},
    task::{PromptSpec, TaskKind},
    Pipeline,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Top-level process configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Process name (the process id)
    pub name: String,

    /// Process version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Default input values, overridden by the caller's inputs
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,

    /// Treat every step as gating unless it says otherwise
    #[serde(default)]
    pub gate_all: bool,

    /// Task definitions
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    /// Pipeline steps, in execution order
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Which step result becomes the run's domain fields
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

/// Task definition as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub kind: TaskKind,

    pub prompt: PromptSpec,

    /// JSON-schema-like output contract
    #[serde(default)]
    pub output_schema: Value,

    /// Gating default for steps running this task
    #[serde(default)]
    pub gating: Option<bool>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step identifier
    pub id: String,

    /// Task name to run
    pub task: String,

    /// Input bindings (`key: "$inputs.x"`, `"$steps.id.path"`, `"$artifacts"` or a literal)
    #[serde(default)]
    pub input: BTreeMap<String, Value>,

    /// Start the step input from the run inputs
    #[serde(default = "default_true")]
    pub inherit_inputs: bool,

    /// Abort the run when this step reports `success: false`
    #[serde(default)]
    pub gating: Option<bool>,

    /// Only run when this condition holds
    #[serde(default)]
    pub when: Option<String>,

    /// Human checkpoint around this step
    #[serde(default)]
    pub breakpoint: Option<BreakpointConfig>,

    /// Executor timeout for this step (in seconds)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Breakpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointConfig {
    pub title: String,

    pub question: String,

    #[serde(default)]
    pub position: BreakpointPosition,

    /// Summary bindings shown to the reviewer
    #[serde(default)]
    pub summary: BTreeMap<String, Value>,

    /// Resolve automatically after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Decision applied on timeout
    #[serde(default)]
    pub on_timeout: TimeoutAction,
}

/// Output selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Step whose result provides the domain fields (default: last executed step)
    #[serde(default)]
    pub from: Option<String>,

    /// Restrict the domain fields to these keys
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl ProcessConfig {
    /// Load process configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read process file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse process configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProcessConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the process configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Process name must not be empty");
        }

        // Check that all task names are unique and schemas are objects
        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                anyhow::bail!("Duplicate task name: {}", task.name);
            }
            if !matches!(task.output_schema, Value::Null | Value::Object(_)) {
                anyhow::bail!("Task '{}' output_schema must be a mapping", task.name);
            }
            if task.prompt.task.trim().is_empty() {
                anyhow::bail!("Task '{}' has an empty prompt task", task.name);
            }
        }

        // Check that all step IDs are unique
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(step.id.as_str()) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
        }

        // Steps may only read results of steps that run before them
        let positions: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();

        for (index, step_config) in self.steps.iter().enumerate() {
            if !task_names.contains(step_config.task.as_str()) {
                anyhow::bail!(
                    "Step '{}' references non-existent task '{}'",
                    step_config.id,
                    step_config.task
                );
            }

            let step = Step::from_config(step_config, false).map_err(anyhow::Error::msg)?;

            for referenced in step.referenced_steps() {
                Self::check_reference(&positions, &step.id, referenced, index, false)?;
            }

            if let Some(breakpoint) = &step.breakpoint {
                let allow_self = breakpoint.position == BreakpointPosition::After;
                for referenced in breakpoint.summary.iter().filter_map(|(_, b)| b.referenced_step()) {
                    Self::check_reference(&positions, &step.id, referenced, index, allow_self)?;
                }
                if breakpoint.title.trim().is_empty() || breakpoint.question.trim().is_empty() {
                    anyhow::bail!("Step '{}' breakpoint needs a title and a question", step.id);
                }
            }
        }

        if let Some(from) = self.output.as_ref().and_then(|o| o.from.as_ref()) {
            if !positions.contains_key(from.as_str()) {
                anyhow::bail!("Output references non-existent step '{}'", from);
            }
        }

        Ok(())
    }

    fn check_reference(
        positions: &HashMap<&str, usize>,
        step_id: &str,
        referenced: &str,
        index: usize,
        allow_self: bool,
    ) -> Result<()> {
        match positions.get(referenced) {
            None => anyhow::bail!(
                "Step '{}' references non-existent step '{}'",
                step_id,
                referenced
            ),
            Some(&pos) if pos < index || (allow_self && pos == index) => Ok(()),
            Some(_) => anyhow::bail!(
                "Step '{}' references step '{}' which does not run before it",
                step_id,
                referenced
            ),
        }
    }

    /// Whether the step at `index` gates the run
    ///
    /// Step setting, then task setting, then `gate_all`; otherwise only the
    /// first step gates.
    pub fn resolve_gating(&self, index: usize, step: &StepConfig) -> bool {
        let task_gating = self
            .tasks
            .iter()
            .find(|t| t.name == step.task)
            .and_then(|t| t.gating);

        step.gating
            .or(task_gating)
            .unwrap_or(self.gate_all || index == 0)
    }

    /// Default inputs as a JSON object
    pub fn default_inputs(&self) -> serde_json::Map<String, Value> {
        self.defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        Pipeline::from_config(self)
    }
}
