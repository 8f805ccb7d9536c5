//! Database initialization: connection options and schema.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Bumped whenever schema.sql changes shape. Stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Concurrent ticket commits queue on the write lock for up to this long.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the SQLite database and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database ready at {} (schema v{})", db_path, SCHEMA_VERSION);
    Ok(pool)
}

/// Split a schema script into statements. `--` comments are dropped first so
/// a `;` inside one cannot cut a statement. String literals must not contain
/// `--` or `;`.
fn schema_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .map(|line| line.split_once("--").map_or(line, |(code, _)| code))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply schema.sql in one transaction. Every statement is `IF NOT EXISTS`,
/// so re-running is a no-op.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current: i64 = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await?
        .get(0);
    if current > SCHEMA_VERSION {
        return Err(sqlx::Error::Configuration(
            format!(
                "database schema v{} is newer than supported v{}",
                current, SCHEMA_VERSION
            )
            .into(),
        ));
    }

    let mut tx = pool.begin().await?;
    for statement in schema_statements(include_str!("schema.sql")) {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if current < SCHEMA_VERSION {
        info!("Migrated schema from v{} to v{}", current, SCHEMA_VERSION);
    }
    Ok(())
}
