mod models;

pub use models::*;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub type DbPool = SqlitePool;

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    // Strip comment lines first so a `;` inside a comment cannot split a statement
    let cleaned: String = sql
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    for statement in cleaned.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("orgbridge.db");

    info!("Initializing database at {}", db_path.display());

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users and legacy sessions
    execute_sql(pool, include_str!("../../migrations/001_users_sessions.sql")).await?;

    // Migration 002: Organisations, groups and teams
    execute_sql(pool, include_str!("../../migrations/002_organisations.sql")).await?;

    info!("Migrations completed");
    Ok(())
}

/// Whether a storage error is a write conflict that a fresh transaction can resolve.
///
/// Covers SQLite busy/locked results (including `SQLITE_BUSY_SNAPSHOT` from a
/// stale read snapshot) and unique-constraint races between concurrent creators.
pub fn is_write_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return true;
            }
            let busy_code = matches!(
                db_err.code().as_deref(),
                Some("5" | "6" | "261" | "262" | "517")
            );
            let msg = db_err.message();
            busy_code || msg.contains("database is locked") || msg.contains("database table is locked")
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    /// A migrated database living in a temp dir that is removed on drop.
    pub struct TestDb {
        pub pool: DbPool,
        _dir: TempDir,
    }

    pub async fn test_db() -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let pool = init(dir.path()).await.unwrap();
        TestDb { pool, _dir: dir }
    }

    pub async fn insert_user(
        pool: &DbPool,
        email: &str,
        external_user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO users (external_user_id, email, name, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(external_user_id)
        .bind(email)
        .bind(email.split('@').next())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .unwrap()
    }
}
