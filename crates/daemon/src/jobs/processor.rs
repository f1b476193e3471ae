use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::errors::PipelineError;
use crate::jobs::{RunManager, RunStatus};
use crate::pipeline::GenerationRun;

/// Drains pending runs strictly one at a time.
pub struct RunProcessor {
    runs: Arc<RunManager>,
    generation: Arc<GenerationRun>,
    poll_interval: Duration,
}

impl RunProcessor {
    pub fn new(runs: Arc<RunManager>, generation: Arc<GenerationRun>, poll_interval: Duration) -> Self {
        RunProcessor {
            runs,
            generation,
            poll_interval,
        }
    }

    /// Execute one run to a terminal state and record the outcome.
    pub async fn process_run(&self, id: &str) -> Result<RunStatus> {
        // Registered before the status read so a cancel from here on always
        // reaches either the status check or the running pipeline.
        let token = self.runs.token_for(id);
        let status = self.drive(id, &token).await;
        self.runs.release(id);
        status
    }

    async fn drive(&self, id: &str, token: &CancellationToken) -> Result<RunStatus> {
        let Some(run) = self.runs.get_run(id)? else {
            anyhow::bail!("run {id} disappeared");
        };
        if run.status != RunStatus::Pending {
            return Ok(run.status);
        }
        if !self.runs.mark_running(id)? {
            let status = self
                .runs
                .get_run(id)?
                .map_or(RunStatus::Cancelled, |r| r.status);
            tracing::info!("[RUNS] run {} left pending before start: {:?}", id, status);
            return Ok(status);
        }
        tracing::info!("[RUNS] starting run {}", id);

        let runs = self.runs.clone();
        let run_id = id.to_string();
        let progress = move |p: f64| {
            if let Err(e) = runs.set_progress(&run_id, p) {
                tracing::warn!("[RUNS] progress update for {} failed: {}", run_id, e);
            }
        };
        let outcome = self
            .generation
            .execute(id, &run.request, token, &progress)
            .await;

        let status = match outcome {
            Ok(_) if token.is_cancelled() => RunStatus::Cancelled,
            Ok(plan) => {
                if self.runs.store_plan(id, &plan)? {
                    RunStatus::Completed
                } else {
                    RunStatus::Cancelled
                }
            }
            Err(PipelineError::Cancelled) => RunStatus::Cancelled,
            Err(e) => {
                tracing::error!("[RUNS] run {} failed: {}", id, e);
                self.runs.fail(id, &e.to_string())?;
                RunStatus::Failed
            }
        };
        if status == RunStatus::Cancelled {
            self.runs.update_status(id, RunStatus::Cancelled, None)?;
        }
        tracing::info!("[RUNS] run {} finished: {:?}", id, status);
        Ok(status)
    }

    /// Work through the queue; stops early once `shutdown` fires.
    pub async fn process_pending(&self, shutdown: &CancellationToken) -> Result<usize> {
        let pending = self.runs.pending_runs()?;
        for id in &pending {
            if shutdown.is_cancelled() {
                break;
            }
            if let Err(e) = self.process_run(id).await {
                tracing::error!("[RUNS] error processing run {}: {:?}", id, e);
                let _ = self.runs.fail(id, &e.to_string());
            }
        }
        Ok(pending.len())
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if let Err(e) = self.process_pending(&shutdown).await {
                tracing::error!("[RUNS] error listing pending runs: {:?}", e);
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("[RUNS] processor stopped");
    }
}
