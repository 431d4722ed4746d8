//! Job-scoped log capture.
//!
//! A run's id and buffer live in a task-local, so any code running under
//! [`scope`] or [`sync_scope`] can log into the right job without threading
//! the id through every call. Lines are always forwarded to `tracing` too.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::database::models::{JobLogEntry, LogLevel};

tokio::task_local! {
    static CURRENT_RUN: RunLog;
}

/// Handle to one run's live log buffer.
#[derive(Debug, Clone)]
pub struct RunLog {
    job_id: Arc<str>,
    buffer: Arc<Mutex<Vec<JobLogEntry>>>,
}

impl RunLog {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: Arc::from(job_id),
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn push(&self, entry: JobLogEntry) {
        self.buffer.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<JobLogEntry> {
        self.buffer.lock().clone()
    }
}

/// Registry of live run buffers, keyed by job id.
#[derive(Debug, Default)]
pub struct LogCorrelator {
    live: DashMap<String, RunLog>,
}

impl LogCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh buffer for `job_id`, replacing any stale one.
    pub fn open(&self, job_id: &str) -> RunLog {
        let run = RunLog::new(job_id);
        self.live.insert(job_id.to_string(), run.clone());
        run
    }

    /// Copy of the live entries, if the run is still open.
    pub fn snapshot(&self, job_id: &str) -> Option<Vec<JobLogEntry>> {
        self.live.get(job_id).map(|run| run.entries())
    }

    /// Remove the buffer, returning what it held.
    pub fn close(&self, job_id: &str) -> Option<Vec<JobLogEntry>> {
        self.live.remove(job_id).map(|(_, run)| run.entries())
    }

    pub fn live_runs(&self) -> usize {
        self.live.len()
    }

    /// Guard that closes the buffer when dropped.
    pub fn guard(self: &Arc<Self>, job_id: &str) -> RunLogGuard {
        RunLogGuard {
            correlator: Arc::clone(self),
            job_id: job_id.to_string(),
        }
    }
}

/// Releases a run's buffer on drop, whatever path the run took.
pub struct RunLogGuard {
    correlator: Arc<LogCorrelator>,
    job_id: String,
}

impl Drop for RunLogGuard {
    fn drop(&mut self) {
        self.correlator.close(&self.job_id);
    }
}

/// Run `fut` with `run` as the ambient run.
pub async fn scope<F: Future>(run: RunLog, fut: F) -> F::Output {
    CURRENT_RUN.scope(run, fut).await
}

/// Run `f` with `run` as the ambient run. Used on blocking threads.
pub fn sync_scope<R>(run: RunLog, f: impl FnOnce() -> R) -> R {
    CURRENT_RUN.sync_scope(run, f)
}

/// Job id of the ambient run, if any.
pub fn current_job_id() -> Option<Arc<str>> {
    CURRENT_RUN.try_with(|run| run.job_id.clone()).ok()
}

pub fn log(level: LogLevel, message: impl AsRef<str>) {
    let message = message.as_ref();
    let job_id = CURRENT_RUN
        .try_with(|run| {
            run.push(JobLogEntry::new(level, message));
            run.job_id.clone()
        })
        .ok();

    match (level, job_id) {
        (LogLevel::Debug, Some(id)) => tracing::debug!(job_id = %id, "{}", message),
        (LogLevel::Info, Some(id)) => tracing::info!(job_id = %id, "{}", message),
        (LogLevel::Warn, Some(id)) => tracing::warn!(job_id = %id, "{}", message),
        (LogLevel::Error, Some(id)) => tracing::error!(job_id = %id, "{}", message),
        (LogLevel::Debug, None) => tracing::debug!("{}", message),
        (LogLevel::Info, None) => tracing::info!("{}", message),
        (LogLevel::Warn, None) => tracing::warn!("{}", message),
        (LogLevel::Error, None) => tracing::error!("{}", message),
    }
}

pub fn debug(message: impl AsRef<str>) {
    log(LogLevel::Debug, message);
}

pub fn info(message: impl AsRef<str>) {
    log(LogLevel::Info, message);
}

pub fn warn(message: impl AsRef<str>) {
    log(LogLevel::Warn, message);
}

pub fn error(message: impl AsRef<str>) {
    log(LogLevel::Error, message);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(entries: &[JobLogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_scoped_logs_land_in_buffer() {
        let correlator = LogCorrelator::new();
        let run = correlator.open("job-1");

        scope(run, async {
            info("starting");
            warn("bucket empty");
            assert_eq!(current_job_id().as_deref(), Some("job-1"));
        })
        .await;

        let entries = correlator.snapshot("job-1").unwrap();
        assert_eq!(messages(&entries), vec!["starting", "bucket empty"]);
        assert_eq!(entries[1].level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn test_logs_outside_a_run_are_not_captured() {
        let correlator = LogCorrelator::new();
        correlator.open("job-1");
        info("process-level line");
        assert!(current_job_id().is_none());
        assert!(correlator.snapshot("job-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_mix() {
        let correlator = Arc::new(LogCorrelator::new());
        let mut handles = Vec::new();
        for name in ["a", "b"] {
            let run = correlator.open(name);
            handles.push(tokio::spawn(scope(run, async move {
                for i in 0..20 {
                    info(format!("{}-{}", name, i));
                    tokio::task::yield_now().await;
                }
            })));
        }
        for h in handles {
            h.await.unwrap();
        }

        for name in ["a", "b"] {
            let entries = correlator.snapshot(name).unwrap();
            assert_eq!(entries.len(), 20);
            assert!(entries.iter().all(|e| e.message.starts_with(name)));
        }
    }

    #[tokio::test]
    async fn test_sync_scope_on_blocking_thread() {
        let correlator = LogCorrelator::new();
        let run = correlator.open("job-2");
        tokio::task::spawn_blocking(move || {
            sync_scope(run, || info("from blocking thread"));
        })
        .await
        .unwrap();
        assert_eq!(
            messages(&correlator.snapshot("job-2").unwrap()),
            vec!["from blocking thread"]
        );
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer_run() {
        let correlator = LogCorrelator::new();
        let outer = correlator.open("outer");
        let inner = correlator.open("inner");
        scope(outer, async {
            info("o1");
            scope(inner, async { info("i1") }).await;
            info("o2");
        })
        .await;
        assert_eq!(messages(&correlator.snapshot("outer").unwrap()), vec!["o1", "o2"]);
        assert_eq!(messages(&correlator.snapshot("inner").unwrap()), vec!["i1"]);
    }

    #[test]
    fn test_guard_releases_buffer() {
        let correlator = Arc::new(LogCorrelator::new());
        correlator.open("job-3");
        {
            let _guard = correlator.guard("job-3");
            assert_eq!(correlator.live_runs(), 1);
        }
        assert_eq!(correlator.live_runs(), 0);
        assert!(correlator.close("job-3").is_none());
    }
}
