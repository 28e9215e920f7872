//! Append-only run journal
//!
//! Layout per run:
//! - `<root>/<runId>/journal.jsonl`: one `{timestamp, type, id, event, data}` entry per line
//! - `<root>/<runId>/state.json`: `{runId, nextEventId, status}`

use crate::execution::ExecutionEvent;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

pub const JOURNAL_FILE: &str = "journal.jsonl";
pub const STATE_FILE: &str = "state.json";

/// Contents of `state.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalState {
    pub run_id: Uuid,
    pub next_event_id: u64,
    pub status: String,
}

/// Writes journal entries under a root directory
#[derive(Debug)]
pub struct RunJournal {
    root: PathBuf,
    // Serializes read-modify-write of state.json
    lock: Mutex<()>,
}

impl RunJournal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn run_dir(&self, run_id: Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Append one event to the journal of its run
    pub fn append(&self, event: &ExecutionEvent) -> Result<u64> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Journal lock poisoned"))?;

        let run_id = event.run_id();
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let state_path = dir.join(STATE_FILE);
        let mut state = Self::read_state(&state_path)?.unwrap_or(JournalState {
            run_id,
            next_event_id: 1,
            status: "created".to_string(),
        });

        let id = state.next_event_id;
        let data = serde_json::to_value(event).context("Failed to encode event")?;
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "type": "event",
            "id": id.to_string(),
            "event": event.name(),
            "data": data,
        });

        let journal_path = dir.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .with_context(|| format!("Failed to open {}", journal_path.display()))?;
        writeln!(file, "{}", entry)?;

        state.next_event_id = id + 1;
        if let Some(status) = event.status() {
            state.status = status.snake_name().to_string();
        }
        let encoded = serde_json::to_string_pretty(&state)?;
        fs::write(&state_path, encoded + "\n")
            .with_context(|| format!("Failed to write {}", state_path.display()))?;

        Ok(id)
    }

    fn read_state(path: &Path) -> Result<Option<JournalState>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(
                serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt journal state {}", path.display()))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Current `state.json` of a run
    pub fn state(&self, run_id: Uuid) -> Result<Option<JournalState>> {
        Self::read_state(&self.run_dir(run_id).join(STATE_FILE))
    }

    /// All entries of a run, in order
    pub fn entries(&self, run_id: Uuid) -> Result<Vec<Value>> {
        let path = self.run_dir(run_id).join(JOURNAL_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };

        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Corrupt journal entry"))
            .collect()
    }

    /// Event handler that journals every event, logging failures
    ///
    /// Appends are small synchronous `std::fs` writes made on the task that
    /// emits the event, so entries land in event-id order. Fine for the CLI,
    /// which runs one pipeline at a time; a busy async service should journal
    /// from a dedicated task instead.
    pub fn handler(self: Arc<Self>) -> impl Fn(&ExecutionEvent) + Send + Sync + 'static {
        move |event: &ExecutionEvent| {
            if let Err(e) = self.append(event) {
                warn!("Failed to journal {} event: {:#}", event.name(), e);
            }
        }
    }
}
