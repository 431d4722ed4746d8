//! Orchestrator: admission, background execution and the caller surface.
//!
//! A trigger is admitted only when the inputs are present and no other run
//! holds the single-flight slot. The slot is an owned `tokio` mutex guard
//! moved into the background task, so it is released only after the job's
//! terminal transition.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::PipelineSettings;
use crate::database::DbPool;
use crate::database::models::{DATASET_UPLOADED, FINAL_FILE_READY, FlagValue};
use crate::database::repositories::{
    FlagRepository, JobRepository, SqlxFlagRepository, SqlxJobRepository,
};
use crate::domain::step::{LAST_PERFORMANCE_STEP, StepId};
use crate::logging::correlator;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::flags::{PipelineFlags, PipelineStateView};
use crate::pipeline::ledger::{JobLedger, JobView, Transition};
use crate::state::StepPreview;
use crate::upload::{self, DataFiles};
use crate::{Error, Result};

/// Error recorded on jobs a previous process left unfinished.
pub const INTERRUPTED_REASON: &str = "interrupted by process restart";

/// What the data directory currently holds.
#[derive(Debug, Clone, Serialize)]
pub struct DataFilesView {
    /// True when the last upload succeeded and the required files are present.
    pub uploaded: bool,
    pub registration: Option<String>,
    pub grades: Vec<String>,
    pub files: Vec<String>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Orchestrator {
    ctx: PipelineContext,
    ledger: Arc<JobLedger>,
    flags: Arc<PipelineFlags>,
    run_slot: Arc<Mutex<()>>,
}

impl Orchestrator {
    /// Build an orchestrator backed by the SQLite repositories on `pool`.
    pub fn new(ctx: PipelineContext, pool: DbPool) -> Self {
        Self::with_repositories(
            ctx,
            Arc::new(SqlxJobRepository::new(pool.clone())),
            Arc::new(SqlxFlagRepository::new(pool)),
        )
    }

    pub fn with_repositories(
        ctx: PipelineContext,
        jobs: Arc<dyn JobRepository>,
        flags: Arc<dyn FlagRepository>,
    ) -> Self {
        let ledger = Arc::new(JobLedger::new(jobs, Arc::clone(&ctx.correlator)));
        Self {
            ctx,
            ledger,
            flags: Arc::new(PipelineFlags::new(flags)),
            run_slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// Take the single-flight slot, or reject if anything is running.
    async fn acquire_slot(&self) -> Result<OwnedMutexGuard<()>> {
        let slot = Arc::clone(&self.run_slot)
            .try_lock_owned()
            .map_err(|_| Error::RunActive("another pipeline operation is in progress".into()))?;
        let running = self.ledger.count_running().await?;
        if running > 0 {
            return Err(Error::RunActive(format!(
                "{} job(s) recorded as RUNNING",
                running
            )));
        }
        Ok(slot)
    }

    /// Admit and start a run of `step`, returning the new job id.
    pub async fn trigger(&self, step: &str) -> Result<String> {
        let (job_id, _handle) = self.spawn(step).await?;
        Ok(job_id)
    }

    /// Trigger `step` and wait for its job to reach a terminal state.
    pub async fn run(&self, step: &str) -> Result<JobView> {
        let (job_id, handle) = self.spawn(step).await?;
        if let Err(e) = handle.await {
            error!(job_id = %job_id, error = %e, "Background run task did not finish cleanly");
        }
        self.ledger
            .get(&job_id)
            .await?
            .ok_or_else(|| Error::not_found("Job", job_id))
    }

    async fn spawn(&self, step: &str) -> Result<(String, JoinHandle<()>)> {
        let step = StepId::parse(step)?;
        upload::require_inputs(self.ctx.data_dir())?;
        let slot = self.acquire_slot().await?;
        let job_id = self.ledger.create(step).await?;
        info!(job_id = %job_id, step = %step, "Job admitted");

        let handle = tokio::spawn(execute(
            self.ctx.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.flags),
            step,
            job_id.clone(),
            slot,
        ));
        Ok((job_id, handle))
    }

    pub async fn status(&self, job_id: &str) -> Result<Option<JobView>> {
        self.ledger.get(job_id).await
    }

    pub async fn jobs(&self, limit: i32) -> Result<Vec<JobView>> {
        self.ledger.list_recent(limit).await
    }

    /// Latest preview for `step`, or `None` if it has not produced output.
    pub fn preview(&self, step: &str) -> Result<Option<StepPreview>> {
        Ok(self.ctx.previews.get(StepId::parse(step)?))
    }

    pub async fn state(&self) -> PipelineStateView {
        self.flags.state_view().await
    }

    /// Durable artifacts currently on disk for `step`.
    pub fn output(&self, step: &str) -> Result<Vec<PathBuf>> {
        Ok(self.ctx.snapshots.existing(StepId::parse(step)?))
    }

    /// Replace the dataset with `archive` and start a fresh session.
    pub async fn upload(&self, archive: &Path) -> Result<DataFiles> {
        let _slot = self.acquire_slot().await?;
        self.reset_session().await?;
        self.flags.set(DATASET_UPLOADED, FlagValue::False).await?;

        let archive = archive.to_path_buf();
        let data_dir = self.ctx.data_dir().to_path_buf();
        let files = tokio::task::spawn_blocking(move || upload::stage_archive(&archive, &data_dir))
            .await
            .map_err(|e| Error::Other(format!("dataset staging task failed: {}", e)))??;

        self.flags.set(DATASET_UPLOADED, FlagValue::True).await?;
        Ok(files)
    }

    pub async fn data_files(&self) -> Result<DataFilesView> {
        let files = upload::scan_data_dir(self.ctx.data_dir())?;
        let uploaded = files.is_complete() && self.flags.is_true(DATASET_UPLOADED).await?;
        Ok(DataFilesView {
            uploaded,
            registration: files.registration.as_deref().map(file_name),
            grades: files.grades.iter().map(|p| file_name(p)).collect(),
            files: files.file_names(),
        })
    }

    /// Clear the state store, previews and flags.
    pub async fn reset_session(&self) -> Result<()> {
        self.ctx.clear_state();
        let cleared = self.flags.clear().await?;
        info!(flags = cleared, "Pipeline session reset");
        Ok(())
    }

    /// Load `step`'s snapshot back into the state store.
    pub async fn restore(&self, step: &str) -> Result<bool> {
        let step = StepId::parse(step)?;
        let _slot = self.acquire_slot().await?;
        self.restore_blocking(vec![step])
            .await
            .map(|restored| !restored.is_empty())
    }

    /// Restore every step that runs before `step` and has a snapshot.
    pub async fn resume_before(&self, step: &str) -> Result<Vec<StepId>> {
        let step = StepId::parse(step)?;
        let _slot = self.acquire_slot().await?;
        let earlier: Vec<StepId> = StepId::ALL
            .into_iter()
            .take_while(|s| *s != step)
            .collect();
        let restored = self.restore_blocking(earlier).await?;
        info!(before = %step, restored = restored.len(), "Resumed from snapshots");
        Ok(restored)
    }

    async fn restore_blocking(&self, steps: Vec<StepId>) -> Result<Vec<StepId>> {
        let ctx = self.ctx.clone();
        tokio::task::spawn_blocking(move || {
            let mut restored = Vec::new();
            for step in steps {
                if ctx.restore_step(step)? {
                    restored.push(step);
                }
            }
            Ok(restored)
        })
        .await
        .map_err(|e| Error::Other(format!("snapshot restore task failed: {}", e)))?
    }

    pub fn settings(&self) -> PipelineSettings {
        self.ctx.settings()
    }

    /// Replace the settings used by subsequent runs.
    pub fn update_settings(&self, settings: PipelineSettings) -> Result<()> {
        settings.validate()?;
        self.ctx.set_settings(settings);
        Ok(())
    }

    /// Fail jobs a previous process left unfinished. Call once at startup.
    pub async fn recover(&self) -> Result<u64> {
        self.ledger.recover_interrupted(INTERRUPTED_REASON).await
    }
}

/// Background body of one admitted run. Always ends in a terminal transition.
async fn execute(
    ctx: PipelineContext,
    ledger: Arc<JobLedger>,
    flags: Arc<PipelineFlags>,
    step: StepId,
    job_id: String,
    _slot: OwnedMutexGuard<()>,
) {
    let run = ctx.correlator.open(&job_id);
    let _buffer = ctx.correlator.guard(&job_id);

    if let Err(e) = ledger.transition(&job_id, Transition::Running).await {
        error!(job_id = %job_id, error = %e, "Failed to mark job running");
    }

    let blocking_run = run.clone();
    let blocking_ctx = ctx.clone();
    let outcome = correlator::scope(run.clone(), async move {
        tokio::task::spawn_blocking(move || {
            correlator::sync_scope(blocking_run, || blocking_ctx.run_step(step))
        })
        .await
        .unwrap_or_else(|join| {
            let reason = if join.is_panic() {
                panic_message(join.into_panic())
            } else {
                join.to_string()
            };
            Err(Error::step(format!("{} panicked: {}", step, reason)))
        })
    })
    .await;

    let transition = correlator::scope(run, async {
        match outcome {
            Ok(files) => {
                correlator::info(format!("{} completed", step));
                record_flag(&flags, &step.flag_key(), FlagValue::Completed).await;
                if step == StepId::Performance(LAST_PERFORMANCE_STEP) {
                    record_flag(&flags, FINAL_FILE_READY, FlagValue::True).await;
                }
                Transition::Completed {
                    output_files: files
                        .iter()
                        .map(|p| p.to_string_lossy().to_string())
                        .collect(),
                }
            }
            Err(e) => {
                correlator::error(format!("{} failed: {}", step, e));
                record_flag(&flags, &step.flag_key(), FlagValue::Failed).await;
                Transition::Failed {
                    error: e.to_string(),
                }
            }
        }
    })
    .await;

    if let Err(e) = ledger.transition(&job_id, transition).await {
        error!(job_id = %job_id, error = %e, "Failed to record job outcome");
    }
}

async fn record_flag(flags: &PipelineFlags, key: &str, value: FlagValue) {
    if let Err(e) = flags.set(key, value).await {
        correlator::warn(format!("Failed to set flag {}: {}", key, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
