//! Job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{JobDbModel, JobStatus};
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: &str) -> Result<JobDbModel>;
    async fn list_recent_jobs(&self, limit: i32) -> Result<Vec<JobDbModel>>;
    async fn count_jobs_by_status(&self, status: JobStatus) -> Result<i64>;
    async fn create_job(&self, job: &JobDbModel) -> Result<()>;
    /// Move a PENDING job to RUNNING. Returns false if the job was not PENDING.
    async fn mark_running(&self, id: &str, started_at: &str) -> Result<bool>;
    /// Move a non-terminal job to COMPLETED or FAILED, freezing its outputs and logs.
    /// Returns false if the job does not exist or is already terminal.
    async fn mark_terminal(
        &self,
        id: &str,
        status: JobStatus,
        output_files: &str,
        error_message: Option<&str>,
        logs: &str,
        completed_at: &str,
    ) -> Result<bool>;
    /// Fail every PENDING or RUNNING job. Returns the number of rows touched.
    async fn fail_unfinished_jobs(&self, reason: &str) -> Result<u64>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn get_job(&self, id: &str) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM pipeline_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list_recent_jobs(&self, limit: i32) -> Result<Vec<JobDbModel>> {
        let jobs = sqlx::query_as::<_, JobDbModel>(
            "SELECT * FROM pipeline_job ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn count_jobs_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pipeline_job WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn create_job(&self, job: &JobDbModel) -> Result<()> {
        retry_on_sqlite_busy("create_job", || async {
            sqlx::query(
                r#"
                INSERT INTO pipeline_job
                    (id, step_name, status, output_files, error_message, logs, created_at, started_at, completed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&job.id)
            .bind(&job.step_name)
            .bind(&job.status)
            .bind(&job.output_files)
            .bind(&job.error_message)
            .bind(&job.logs)
            .bind(&job.created_at)
            .bind(&job.started_at)
            .bind(&job.completed_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_running(&self, id: &str, started_at: &str) -> Result<bool> {
        retry_on_sqlite_busy("mark_running", || async {
            let result = sqlx::query(
                "UPDATE pipeline_job SET status = 'RUNNING', started_at = ? WHERE id = ? AND status = 'PENDING'",
            )
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn mark_terminal(
        &self,
        id: &str,
        status: JobStatus,
        output_files: &str,
        error_message: Option<&str>,
        logs: &str,
        completed_at: &str,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(Error::validation(format!(
                "{} is not a terminal job status",
                status
            )));
        }
        retry_on_sqlite_busy("mark_terminal", || async {
            let result = sqlx::query(
                r#"
                UPDATE pipeline_job SET
                    status = ?,
                    output_files = ?,
                    error_message = ?,
                    logs = ?,
                    completed_at = ?
                WHERE id = ? AND status IN ('PENDING', 'RUNNING')
                "#,
            )
            .bind(status.as_str())
            .bind(output_files)
            .bind(error_message)
            .bind(logs)
            .bind(completed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn fail_unfinished_jobs(&self, reason: &str) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE pipeline_job SET
                status = 'FAILED',
                error_message = ?,
                completed_at = ?
            WHERE status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(reason)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
