//! Step and run result models

use crate::core::artifact::Artifact;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Keys the runner owns in a successful run result
const RESERVED_KEYS: [&str; 4] = ["success", "artifacts", "duration", "metadata"];

/// Why an executor's output could not be read as a step result
#[derive(Debug, Error)]
pub enum ResultContractError {
    #[error("step result must be a JSON object")]
    NotAnObject,

    #[error("step result is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("step result field '{field}' is invalid: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The object returned by the task executor for one step
///
/// Only `success` and `artifacts` are interpreted; the full object is kept
/// verbatim in `value` for later steps and for failure details.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub success: bool,
    pub artifacts: Vec<Artifact>,
    pub value: Value,
}

impl StepResult {
    /// Read a step result out of raw executor output
    pub fn from_value(value: Value) -> Result<Self, ResultContractError> {
        let object = value.as_object().ok_or(ResultContractError::NotAnObject)?;

        let success = match object.get("success") {
            Some(raw) => serde_json::from_value::<bool>(raw.clone()).map_err(|source| {
                ResultContractError::InvalidField {
                    field: "success",
                    source,
                }
            })?,
            None => return Err(ResultContractError::MissingField("success")),
        };

        let artifacts = match object.get("artifacts") {
            Some(raw) => serde_json::from_value::<Vec<Artifact>>(raw.clone()).map_err(|source| {
                ResultContractError::InvalidField {
                    field: "artifacts",
                    source,
                }
            })?,
            None => return Err(ResultContractError::MissingField("artifacts")),
        };

        Ok(Self {
            success,
            artifacts,
            value,
        })
    }

    /// Domain fields of the result (everything except `success` and `artifacts`)
    pub fn domain_fields(&self) -> Map<String, Value> {
        domain_fields(&self.value, None)
    }
}

/// Extract the domain fields of a raw result, optionally restricted to `only`
pub fn domain_fields(value: &Value, only: Option<&[String]>) -> Map<String, Value> {
    let Some(object) = value.as_object() else {
        return Map::new();
    };

    object
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .filter(|(key, _)| only.map_or(true, |fields| fields.iter().any(|f| f == *key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Metadata attached to every run result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub process_id: String,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RunMetadata {
    fn to_json(&self) -> Value {
        let mut meta = json!({
            "processId": self.process_id,
            "runId": self.run_id.to_string(),
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let Some(version) = &self.version {
            meta["version"] = json!(version);
        }
        meta
    }
}

/// Final value of a run
///
/// Serializes to the flat process contract:
/// `{ success: true, <domain fields>, artifacts, duration, metadata }` or
/// `{ success: false, error, details, metadata }`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    Success {
        fields: Map<String, Value>,
        artifacts: Vec<Artifact>,
        duration_ms: u64,
        metadata: RunMetadata,
    },
    Failure {
        error: String,
        details: Value,
        metadata: RunMetadata,
    },
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Success { .. })
    }

    /// Artifacts of a successful run (empty for failures)
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            RunResult::Success { artifacts, .. } => artifacts,
            RunResult::Failure { .. } => &[],
        }
    }

    /// A domain field of a successful run
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            RunResult::Success { fields, .. } => fields.get(key),
            RunResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RunResult::Failure { error, .. } => Some(error),
            RunResult::Success { .. } => None,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            RunResult::Failure { details, .. } => Some(details),
            RunResult::Success { .. } => None,
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        match self {
            RunResult::Success { metadata, .. } | RunResult::Failure { metadata, .. } => metadata,
        }
    }

    /// Flat JSON form of the result
    pub fn to_json(&self) -> Value {
        match self {
            RunResult::Success {
                fields,
                artifacts,
                duration_ms,
                metadata,
            } => {
                let mut object = Map::new();
                object.insert("success".to_string(), Value::Bool(true));
                for (key, value) in fields {
                    object.insert(key.clone(), value.clone());
                }
                object.insert("artifacts".to_string(), json!(artifacts));
                object.insert("duration".to_string(), json!(duration_ms));
                object.insert("metadata".to_string(), metadata.to_json());
                Value::Object(object)
            }
            RunResult::Failure {
                error,
                details,
                metadata,
            } => json!({
                "success": false,
                "error": error,
                "details": details,
                "metadata": metadata.to_json(),
            }),
        }
    }
}

impl Serialize for RunResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
