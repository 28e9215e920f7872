//! Task definitions and the task registry

use crate::core::context::lookup;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Keys every task output must carry
pub const REQUIRED_OUTPUT_KEYS: [&str; 2] = ["success", "artifacts"];

/// How a task is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Delegated to an external agent runtime
    #[default]
    Agent,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Agent => "agent",
        }
    }
}

/// The natural-language prompt of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Who the agent should act as
    #[serde(default)]
    pub role: Option<String>,

    /// What to do
    pub task: String,

    /// Background the agent needs
    #[serde(default)]
    pub context: Option<String>,

    /// Ordered instructions
    #[serde(default)]
    pub instructions: Vec<String>,

    /// Description of the expected output
    #[serde(default)]
    pub output_format: Option<String>,
}

/// Immutable description of one kind of agent call
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub name: String,
    pub kind: TaskKind,
    pub prompt: PromptSpec,

    /// JSON-schema-like output contract; `required` always lists
    /// `success` and `artifacts`
    pub output_schema: Value,

    /// Task-level gating default (step config can override)
    pub gating: Option<bool>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, kind: TaskKind, prompt: PromptSpec, output_schema: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            prompt,
            output_schema: normalize_output_schema(output_schema),
            gating: None,
        }
    }

    pub fn with_gating(mut self, gating: Option<bool>) -> Self {
        self.gating = gating;
        self
    }

    /// Keys listed as required by the output contract
    pub fn required_keys(&self) -> Vec<String> {
        self.output_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Assemble the prompt sections in order
    fn assemble(&self) -> String {
        let mut sections = Vec::new();

        if let Some(role) = &self.prompt.role {
            sections.push(format!("## Role\n{}", role.trim()));
        }
        sections.push(format!("## Task\n{}", self.prompt.task.trim()));
        if let Some(context) = &self.prompt.context {
            sections.push(format!("## Context\n{}", context.trim()));
        }
        if !self.prompt.instructions.is_empty() {
            let list: Vec<String> = self
                .prompt
                .instructions
                .iter()
                .enumerate()
                .map(|(i, line)| format!("{}. {}", i + 1, line.trim()))
                .collect();
            sections.push(format!("## Instructions\n{}", list.join("\n")));
        }
        if let Some(format) = &self.prompt.output_format {
            sections.push(format!("## Output Format\n{}", format.trim()));
        }

        let schema = serde_json::to_string_pretty(&self.output_schema).unwrap_or_default();
        sections.push(format!(
            "## Output Schema\nRespond with a single JSON object matching:\n```json\n{}\n```",
            schema
        ));

        sections.join("\n\n")
    }

    /// Render the full prompt for one step
    ///
    /// `scope` is the run scope (`inputs`, `steps`, `artifacts`, `run_id`),
    /// `input` the computed step input. `{{task}}` is the task name,
    /// `{{context}}` the pretty-printed step input, bare names read from the
    /// step input. Unknown placeholders are left as written.
    pub fn render_prompt(&self, scope: &Value, input: &Value) -> String {
        let assembled = self.assemble();

        placeholder_pattern()
            .replace_all(&assembled, |caps: &Captures| {
                let name = &caps[1];
                let resolved = match name {
                    "task" => Some(self.name.clone()),
                    "context" => serde_json::to_string_pretty(input).ok(),
                    _ => {
                        let root = name.split('.').next().unwrap_or_default();
                        let value = if matches!(root, "inputs" | "steps" | "artifacts" | "run_id") {
                            lookup(scope, name)
                        } else {
                            lookup(input, name)
                        };
                        value.map(render_value)
                    }
                };
                resolved.unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Make sure an output schema is an object requiring `success` and `artifacts`
pub fn normalize_output_schema(schema: Value) -> Value {
    let mut schema = match schema {
        Value::Object(map) => Value::Object(map),
        _ => json!({
            "type": "object",
            "properties": {
                "success": { "type": "boolean" },
                "artifacts": { "type": "array" }
            }
        }),
    };

    let mut required: Vec<Value> = schema
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for key in REQUIRED_OUTPUT_KEYS {
        if !required.iter().any(|k| k.as_str() == Some(key)) {
            required.push(json!(key));
        }
    }
    schema["required"] = Value::Array(required);
    schema
}

/// Task name -> definition, built once when a process is loaded
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<TaskDefinition>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; returns false if the name was already taken
    pub fn register(&mut self, task: TaskDefinition) -> bool {
        if self.tasks.contains_key(&task.name) {
            return false;
        }
        self.tasks.insert(task.name.clone(), Arc::new(task));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TaskDefinition>> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered task names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
