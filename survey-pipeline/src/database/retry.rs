//! Retry helpers for ledger and flag writes.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tracing::debug;

use crate::{Error, Result};

const MAX_BUSY_RETRIES: u32 = 10;
const BASE_DELAY: Duration = Duration::from_millis(10);
const MAX_DELAY: Duration = Duration::from_secs(2);

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), by code or by message.
fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(err) = err else {
        return false;
    };
    if let sqlx::Error::Database(db) = err
        && matches!(db.code().as_deref(), Some("5" | "6"))
    {
        return true;
    }
    let message = err.to_string().to_ascii_lowercase();
    message.contains("database is locked") || message.contains("database is busy")
}

/// Whether the error is a primary-key or unique-constraint collision.
pub fn is_unique_violation(err: &Error) -> bool {
    matches!(err, Error::DatabaseSqlx(sqlx::Error::Database(db)) if db.is_unique_violation())
}

/// Exponential delay for `attempt` (0-based), capped, plus up to 25% jitter.
fn backoff(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1u32 << attempt.min(16));
    let capped = exp.min(MAX_DELAY);
    let jitter_ms = random::<u64>() % (capped.as_millis() as u64 / 4 + 1);
    (capped + Duration::from_millis(jitter_ms)).min(MAX_DELAY)
}

/// Run `op`, retrying while SQLite reports the database busy.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if attempt < MAX_BUSY_RETRIES && is_busy(&err) => {
                let delay = backoff(attempt);
                attempt += 1;
                debug!(op = op_name, attempt, ?delay, "SQLite busy, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
