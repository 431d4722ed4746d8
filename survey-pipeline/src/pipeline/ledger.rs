//! Job ledger: durable lifecycle records for triggered runs.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::models::{JobDbModel, JobLogEntry, JobStatus};
use crate::database::repositories::JobRepository;
use crate::domain::step::StepId;
use crate::logging::correlator::LogCorrelator;
use crate::{Error, Result};

/// Requested lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Running,
    Completed { output_files: Vec<String> },
    Failed { error: String },
}

/// Caller-facing view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub step_name: String,
    pub status: JobStatus,
    pub output_files: Vec<String>,
    pub error_message: Option<String>,
    pub logs: Vec<JobLogEntry>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobView {
    fn from_model(model: JobDbModel, live_logs: Option<Vec<JobLogEntry>>) -> Self {
        let status = model.status().unwrap_or(JobStatus::Failed);
        let logs = match (status, live_logs) {
            (JobStatus::Running, Some(live)) => live,
            _ => model.logs(),
        };
        Self {
            output_files: model.output_files(),
            id: model.id,
            step_name: model.step_name,
            status,
            error_message: model.error_message,
            logs,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

pub struct JobLedger {
    repo: Arc<dyn JobRepository>,
    correlator: Arc<LogCorrelator>,
}

impl JobLedger {
    pub fn new(repo: Arc<dyn JobRepository>, correlator: Arc<LogCorrelator>) -> Self {
        Self { repo, correlator }
    }

    /// Record a new PENDING job for `step`.
    pub async fn create(&self, step: StepId) -> Result<String> {
        let job = JobDbModel::new(step.to_string());
        self.repo.create_job(&job).await?;
        debug!(job_id = %job.id, step = %step, "Created job");
        Ok(job.id)
    }

    /// Apply `transition` to `job_id`.
    ///
    /// Unknown jobs and moves out of a terminal state are logged and ignored.
    /// A terminal transition freezes the live log buffer into the record and
    /// releases it.
    pub async fn transition(&self, job_id: &str, transition: Transition) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let applied = match &transition {
            Transition::Running => self.repo.mark_running(job_id, &now).await?,
            Transition::Completed { output_files } => {
                self.finish(job_id, JobStatus::Completed, output_files, None, &now)
                    .await?
            }
            Transition::Failed { error } => {
                self.finish(job_id, JobStatus::Failed, &[], Some(error), &now)
                    .await?
            }
        };

        if !applied {
            match self.repo.get_job(job_id).await {
                Err(Error::NotFound { .. }) => {
                    warn!(job_id, ?transition, "Transition for unknown job ignored");
                }
                Ok(job) => {
                    warn!(job_id, status = %job.status, ?transition, "Transition ignored");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        output_files: &[String],
        error: Option<&str>,
        now: &str,
    ) -> Result<bool> {
        let logs = self.correlator.snapshot(job_id).unwrap_or_default();
        let applied = self
            .repo
            .mark_terminal(
                job_id,
                status,
                &serde_json::to_string(output_files)?,
                error,
                &serde_json::to_string(&logs)?,
                now,
            )
            .await?;
        self.correlator.close(job_id);
        Ok(applied)
    }

    /// Current view of a job, with live logs while it is RUNNING.
    pub async fn get(&self, job_id: &str) -> Result<Option<JobView>> {
        match self.repo.get_job(job_id).await {
            Ok(model) => {
                let live = self.correlator.snapshot(job_id);
                Ok(Some(JobView::from_model(model, live)))
            }
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn count_running(&self) -> Result<i64> {
        self.repo.count_jobs_by_status(JobStatus::Running).await
    }

    pub async fn list_recent(&self, limit: i32) -> Result<Vec<JobView>> {
        let jobs = self.repo.list_recent_jobs(limit).await?;
        Ok(jobs
            .into_iter()
            .map(|job| {
                let live = self.correlator.snapshot(&job.id);
                JobView::from_model(job, live)
            })
            .collect())
    }

    /// Fail every job a previous process left PENDING or RUNNING.
    pub async fn recover_interrupted(&self, reason: &str) -> Result<u64> {
        let count = self.repo.fail_unfinished_jobs(reason).await?;
        if count > 0 {
            warn!(count, reason, "Marked interrupted jobs as failed");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxJobRepository;
    use crate::database::{init_pool, run_migrations};
    use crate::logging::correlator;
    use tempfile::TempDir;

    async fn ledger() -> (JobLedger, Arc<LogCorrelator>, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let url = format!(
            "sqlite:{}?mode=rwc",
            path.to_string_lossy().replace('\\', "/")
        );
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let correlator = Arc::new(LogCorrelator::new());
        let ledger = JobLedger::new(
            Arc::new(SqlxJobRepository::new(pool)),
            Arc::clone(&correlator),
        );
        (ledger, correlator, dir)
    }

    #[tokio::test]
    async fn test_lifecycle_freezes_live_logs() {
        let (ledger, correlator, _dir) = ledger().await;
        let id = ledger.create(StepId::Performance(2)).await.unwrap();
        let run = correlator.open(&id);
        ledger.transition(&id, Transition::Running).await.unwrap();

        correlator::scope(run, async { correlator::info("grouping by LO") }).await;

        let live = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(live.status, JobStatus::Running);
        assert_eq!(live.logs.len(), 1);

        ledger
            .transition(
                &id,
                Transition::Completed {
                    output_files: vec!["outputs/step2_lo.xlsx".into()],
                },
            )
            .await
            .unwrap();

        let done = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.logs, live.logs);
        assert_eq!(done.output_files, vec!["outputs/step2_lo.xlsx"]);
        assert!(done.completed_at.is_some());
        assert_eq!(correlator.live_runs(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_transition_is_noop() {
        let (ledger, _correlator, _dir) = ledger().await;
        ledger
            .transition("missing", Transition::Running)
            .await
            .unwrap();
        assert!(ledger.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let (ledger, _correlator, _dir) = ledger().await;
        let id = ledger.create(StepId::Participation).await.unwrap();
        ledger.transition(&id, Transition::Running).await.unwrap();
        ledger
            .transition(&id, Transition::Failed { error: "bad sheet".into() })
            .await
            .unwrap();
        ledger
            .transition(&id, Transition::Completed { output_files: vec![] })
            .await
            .unwrap();

        let job = ledger.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("bad sheet"));
    }

    #[tokio::test]
    async fn test_recover_interrupted() {
        let (ledger, _correlator, _dir) = ledger().await;
        let running = ledger.create(StepId::Performance(0)).await.unwrap();
        ledger.transition(&running, Transition::Running).await.unwrap();
        let pending = ledger.create(StepId::Performance(1)).await.unwrap();

        assert_eq!(ledger.count_running().await.unwrap(), 1);
        let n = ledger
            .recover_interrupted("interrupted by process restart")
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(ledger.count_running().await.unwrap(), 0);

        for id in [running, pending] {
            let job = ledger.get(&id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert!(job.completed_at.is_some());
        }
    }
}
