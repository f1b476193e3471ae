use anyhow::Result;
use chrono::{DateTime, Utc};
use engine::TimelinePlan;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::pipeline::RunRequest;

pub mod processor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    pub progress: f64,
    pub request: RunRequest,
    pub plan: Option<TimelinePlan>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn text_error(column: usize) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(column, "TEXT".to_string(), rusqlite::types::Type::Text)
}

fn parse_time(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| text_error(column))
}

/// Persists runs and owns the cancellation token of every run in flight.
pub struct RunManager {
    db: Arc<Database>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl RunManager {
    pub fn new(db: Arc<Database>) -> Self {
        RunManager {
            db,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_run(&self, request: &RunRequest) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&RunStatus::Pending)?;
        let request_str = serde_json::to_string(request)?;

        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO runs (id, status, progress, request_json, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, status_str, 0.0, request_str, now, now],
        )?;
        tracing::info!("[RUNS] queued run {}", id);
        Ok(id)
    }

    pub fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let conn = self.db.lock()?;
        let run = conn
            .query_row(
                "SELECT id, status, progress, request_json, plan_json, error, created_at, updated_at FROM runs WHERE id = ?1",
                params![id],
                |row| {
                    let status_str: String = row.get(1)?;
                    let request_str: String = row.get(3)?;
                    let plan_str: Option<String> = row.get(4)?;
                    let created_at: String = row.get(6)?;
                    let updated_at: String = row.get(7)?;

                    let status = serde_json::from_str(&status_str).map_err(|_| text_error(1))?;
                    let request = serde_json::from_str(&request_str).map_err(|_| text_error(3))?;
                    let plan = plan_str
                        .map(|s| serde_json::from_str(&s))
                        .transpose()
                        .map_err(|_| text_error(4))?;

                    Ok(Run {
                        id: row.get(0)?,
                        status,
                        progress: row.get(2)?,
                        request,
                        plan,
                        error: row.get(5)?,
                        created_at: parse_time(&created_at, 6)?,
                        updated_at: parse_time(&updated_at, 7)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }

    /// Oldest first.
    pub fn pending_runs(&self) -> Result<Vec<String>> {
        let status_str = serde_json::to_string(&RunStatus::Pending)?;
        let conn = self.db.lock()?;
        let mut stmt =
            conn.prepare("SELECT id FROM runs WHERE status = ?1 ORDER BY created_at ASC")?;
        let ids = stmt
            .query_map(params![status_str], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    pub fn update_status(&self, id: &str, status: RunStatus, progress: Option<f64>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&status)?;

        let conn = self.db.lock()?;
        if let Some(progress) = progress {
            conn.execute(
                "UPDATE runs SET status = ?1, progress = ?2, updated_at = ?3 WHERE id = ?4",
                params![status_str, progress, now, id],
            )?;
        } else {
            conn.execute(
                "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status_str, now, id],
            )?;
        }
        Ok(())
    }

    pub fn set_progress(&self, id: &str, progress: f64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE runs SET progress = ?1, updated_at = ?2 WHERE id = ?3",
            params![progress.clamp(0.0, 1.0), now, id],
        )?;
        Ok(())
    }

    /// Move a pending run to running. Returns false when the run is no
    /// longer pending, e.g. cancelled between listing and starting.
    pub fn mark_running(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let pending = serde_json::to_string(&RunStatus::Pending)?;
        let running = serde_json::to_string(&RunStatus::Running)?;

        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE runs SET status = ?1, progress = 0.0, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![running, now, id, pending],
        )?;
        Ok(changed == 1)
    }

    /// Record the plan of a running run. Returns false when the run was
    /// cancelled meanwhile; the cancellation stands.
    pub fn store_plan(&self, id: &str, plan: &TimelinePlan) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&RunStatus::Completed)?;
        let running = serde_json::to_string(&RunStatus::Running)?;
        let plan_str = serde_json::to_string(plan)?;

        let conn = self.db.lock()?;
        let changed = conn.execute(
            "UPDATE runs SET status = ?1, progress = 1.0, plan_json = ?2, error = NULL, updated_at = ?3 WHERE id = ?4 AND status = ?5",
            params![status_str, plan_str, now, id, running],
        )?;
        Ok(changed == 1)
    }

    /// A cancelled run stays cancelled.
    pub fn fail(&self, id: &str, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let status_str = serde_json::to_string(&RunStatus::Failed)?;
        let cancelled = serde_json::to_string(&RunStatus::Cancelled)?;

        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE runs SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4 AND status != ?5",
            params![status_str, error, now, id, cancelled],
        )?;
        Ok(())
    }

    /// Register the token a starting run listens on.
    pub fn token_for(&self, id: &str) -> CancellationToken {
        self.tokens()
            .entry(id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    pub fn release(&self, id: &str) {
        self.tokens().remove(id);
    }

    /// Returns false when the run is unknown or already finished.
    ///
    /// The status switch is conditional so it cannot undo a finish that
    /// landed first; the token, when registered, is fired afterwards.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let cancelled = serde_json::to_string(&RunStatus::Cancelled)?;
        let pending = serde_json::to_string(&RunStatus::Pending)?;
        let running = serde_json::to_string(&RunStatus::Running)?;

        let changed = {
            let conn = self.db.lock()?;
            conn.execute(
                "UPDATE runs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN (?4, ?5)",
                params![cancelled, now, id, pending, running],
            )?
        };
        if changed == 0 {
            return Ok(false);
        }
        if let Some(token) = self.tokens().get(id) {
            token.cancel();
        }
        tracing::info!("[RUNS] cancelled run {}", id);
        Ok(true)
    }

    pub fn cancel_all(&self) {
        let tokens = self.tokens();
        for (id, token) in tokens.iter() {
            tracing::info!("[RUNS] cancelling run {} on shutdown", id);
            token.cancel();
        }
    }
}
