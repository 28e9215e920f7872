//! SQLite-based persistence store

use crate::core::RunStatus;
use crate::persistence::{ExecutionSummary, PersistenceBackend, SuspendedRun};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

const SUMMARY_COLUMNS: &str = "id, process_name, version, status, started_at, completed_at, \
     executed_steps, skipped_steps, total_steps, artifact_count, error";

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Create a new SQLite store (`:memory:` for an in-memory database)
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .context("Invalid database path")?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location in the local data dir
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskline")
            .join("runs.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let db_path = db_path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8"))?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                process_name TEXT NOT NULL,
                version TEXT,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                executed_steps INTEGER NOT NULL DEFAULT 0,
                skipped_steps INTEGER NOT NULL DEFAULT 0,
                total_steps INTEGER NOT NULL DEFAULT 0,
                artifact_count INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_process_name ON executions(process_name);
            CREATE INDEX IF NOT EXISTS idx_status ON executions(status);
            CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at);

            CREATE TABLE IF NOT EXISTS suspended_runs (
                id TEXT PRIMARY KEY,
                process_name TEXT NOT NULL,
                step_id TEXT NOT NULL,
                suspended_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize schema")?;

        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let status: String = row.get("status");
        Ok(ExecutionSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            process_name: row.get("process_name"),
            version: row.get("version"),
            status: RunStatus::parse(&status)
                .ok_or_else(|| anyhow!("Unknown run status '{}'", status))?,
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            executed_steps: row.get::<i64, _>("executed_steps") as usize,
            skipped_steps: row.get::<i64, _>("skipped_steps") as usize,
            total_steps: row.get::<i64, _>("total_steps") as usize,
            artifact_count: row.get::<i64, _>("artifact_count") as usize,
            error: row.get("error"),
        })
    }

    fn suspended_from_row(row: &SqliteRow) -> Result<SuspendedRun> {
        let payload: String = row.get("payload");
        serde_json::from_str(&payload).context("Corrupt suspended run record")
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, process_name, version, status, started_at, completed_at,
             executed_steps, skipped_steps, total_steps, artifact_count, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(execution.run_id.to_string())
        .bind(&execution.process_name)
        .bind(&execution.version)
        .bind(execution.status.as_str())
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(execution.executed_steps as i64)
        .bind(execution.skipped_steps as i64)
        .bind(execution.total_steps as i64)
        .bind(execution.artifact_count as i64)
        .bind(&execution.error)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, run_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE id = ?1",
            SUMMARY_COLUMNS
        ))
        .bind(run_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load execution")?;

        row.as_ref().map(Self::summary_from_row).transpose()
    }

    async fn list_executions(&self, process_name: &str) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE process_name = ?1 ORDER BY started_at DESC",
            SUMMARY_COLUMNS
        ))
        .bind(process_name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn list_processes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT process_name
            FROM executions
            ORDER BY process_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list processes")?;

        Ok(rows.iter().map(|row| row.get("process_name")).collect())
    }

    async fn save_suspended(&self, run: &SuspendedRun) -> Result<()> {
        let payload = serde_json::to_string(run).context("Failed to encode suspended run")?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO suspended_runs
            (id, process_name, step_id, suspended_at, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(&run.process_id)
        .bind(&run.step_id)
        .bind(Self::to_naive(run.suspended_at))
        .bind(payload)
        .execute(&self.pool)
        .await
        .context("Failed to save suspended run")?;

        Ok(())
    }

    async fn load_suspended(&self, run_id: Uuid) -> Result<Option<SuspendedRun>> {
        let row = sqlx::query("SELECT payload FROM suspended_runs WHERE id = ?1")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load suspended run")?;

        row.as_ref().map(Self::suspended_from_row).transpose()
    }

    async fn delete_suspended(&self, run_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM suspended_runs WHERE id = ?1")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete suspended run")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_suspended(&self) -> Result<Vec<SuspendedRun>> {
        let rows = sqlx::query("SELECT payload FROM suspended_runs ORDER BY suspended_at ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list suspended runs")?;

        rows.iter().map(Self::suspended_from_row).collect()
    }
}
