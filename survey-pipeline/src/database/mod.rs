//! Persistence layer for the job ledger and the pipeline flags.
//!
//! SQLite through sqlx: pool setup, embedded migrations, models and repositories.

pub mod models;
pub mod repositories;
pub mod retry;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Connections for a file-backed database. The ledger and flag writes are
/// small, so a handful is plenty.
const FILE_POOL_SIZE: u32 = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .pragma("temp_store", "MEMORY")
        .create_if_missing(true))
}

/// Open the pool for `database_url`, e.g. `sqlite:survey-pipeline.db?mode=rwc`.
///
/// Every SQLite memory connection is its own database, so `:memory:` URLs
/// get exactly one connection.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");
    let size = if in_memory { 1 } else { FILE_POOL_SIZE };

    let pool = SqlitePoolOptions::new()
        .max_connections(size)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(connect_options(database_url)?)
        .await?;

    info!(connections = size, in_memory, "Database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> crate::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
