//! Process logging setup and job-scoped log capture.
//!
//! This module provides:
//! - Console and daily-rotating file output with local timezone timestamps
//! - Log file retention cleanup (deletes logs older than 7 days)
//! - [`correlator`]: routing of log lines into the current job's buffer

pub mod correlator;

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "survey_pipeline=info,sqlx=warn";

/// Log retention period in days.
const LOG_RETENTION_DAYS: i64 = 7;

/// Prefix of the rotated log files.
const LOG_FILE_PREFIX: &str = "survey-pipeline.log";

/// Timer that formats timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Initialize console + file logging.
///
/// # Returns
/// The appender's `WorkerGuard`; keep it alive for the app lifetime.
pub fn init_logging(log_dir: &Path) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_timer(LocalTimer),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}

/// Delete rotated log files older than the retention window.
pub async fn cleanup_old_logs(log_dir: &Path) -> std::io::Result<usize> {
    cleanup_logs_older_than(log_dir, LOG_RETENTION_DAYS).await
}

async fn cleanup_logs_older_than(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{}.", LOG_FILE_PREFIX);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut stale: Vec<PathBuf> = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        // survey-pipeline.log.YYYY-MM-DD
        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
        else {
            continue;
        };

        if let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            && file_date < cutoff
        {
            stale.push(path);
        }
    }

    let mut deleted = 0;
    for path in stale {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                deleted += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("survey_pipeline=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }

    #[tokio::test]
    async fn test_cleanup_only_removes_stale_rotations() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("survey-pipeline.log.2000-01-01");
        let today = dir
            .path()
            .join(format!("survey-pipeline.log.{}", Utc::now().format("%Y-%m-%d")));
        let other = dir.path().join("notes.txt");
        for p in [&old, &today, &other] {
            std::fs::write(p, b"x").unwrap();
        }

        let deleted = cleanup_old_logs(dir.path()).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(today.exists());
        assert!(other.exists());
    }
}
