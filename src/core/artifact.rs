//! Generated-document references collected across a run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A reference to a document produced by a step
///
/// Only `path` is required. `format` and any other keys the executor
/// reports are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the generated document
    pub path: String,

    /// Document format (markdown, json, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Extra executor-reported keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Artifact {
    /// Create an artifact with only a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: None,
            extra: Map::new(),
        }
    }

    /// Set the artifact format
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// The `{path, format}` pair shown to reviewers
    pub fn file_ref(&self) -> FileRef {
        FileRef {
            path: self.path.clone(),
            format: self.format.clone(),
        }
    }
}

/// Path and format of an artifact, as presented at a breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    #[serde(default)]
    pub format: Option<String>,
}

/// Append-only, ordered list of the artifacts reported by a run's steps
///
/// Duplicates are kept: two steps reporting the same path produce two entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLog {
    entries: Vec<Artifact>,
}

impl ArtifactLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step's artifacts, preserving their order
    pub fn extend_from(&mut self, artifacts: &[Artifact]) {
        self.entries.extend_from_slice(artifacts);
    }

    pub fn as_slice(&self) -> &[Artifact] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File references for every artifact collected so far
    pub fn file_refs(&self) -> Vec<FileRef> {
        self.entries.iter().map(Artifact::file_ref).collect()
    }
}
