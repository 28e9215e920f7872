//! Pipeline domain model

use crate::core::{
    config::{OutputConfig, ProcessConfig},
    step::Step,
    task::{TaskDefinition, TaskRegistry},
};
use anyhow::Result;
use serde_json::{Map, Value};
use std::sync::Arc;

/// An immutable process definition ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Process name (the process id)
    pub name: String,

    /// Process version
    pub version: Option<String>,

    /// Default input values
    pub defaults: Map<String, Value>,

    /// Task definitions by name
    pub tasks: TaskRegistry,

    /// Steps in execution order
    pub steps: Vec<Step>,

    /// Output selection
    pub output: OutputConfig,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &ProcessConfig) -> Result<Self> {
        config.validate()?;

        let mut tasks = TaskRegistry::new();
        for task in &config.tasks {
            let definition = TaskDefinition::new(
                task.name.clone(),
                task.kind,
                task.prompt.clone(),
                task.output_schema.clone(),
            )
            .with_gating(task.gating);
            tasks.register(definition);
        }

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step_config)| {
                Step::from_config(step_config, config.resolve_gating(index, step_config))
                    .map_err(anyhow::Error::msg)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Pipeline {
            name: config.name.clone(),
            version: config.version.clone(),
            defaults: config.default_inputs(),
            tasks,
            steps,
            output: config.output.clone().unwrap_or_default(),
        })
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Position of a step in execution order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// The task definition a step runs
    pub fn task_for(&self, step: &Step) -> Option<&Arc<TaskDefinition>> {
        self.tasks.get(&step.task)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Merge caller inputs over the declared defaults
    ///
    /// Inputs must be a JSON object (or null, treated as empty).
    pub fn prepare_inputs(&self, inputs: Value) -> Result<Value, String> {
        let provided = match inputs {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(format!(
                    "Inputs must be a JSON object, got {}",
                    json_type_name(&other)
                ))
            }
        };

        let mut merged = self.defaults.clone();
        merged.extend(provided);
        Ok(Value::Object(merged))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
