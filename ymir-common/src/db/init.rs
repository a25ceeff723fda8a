//! Database initialization
//!
//! The store is a single SQLite file. Each bucket is a two-column table
//! (`key`, `value`) so the file behaves like an embedded key-value store.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Bucket holding JSON-encoded model records keyed by model id
pub const MODELS_BUCKET: &str = "models";

/// Open (creating if needed) the store at `db_path` and ensure the buckets exist
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    // Fail fast if another process holds the write lock
    sqlx::query("PRAGMA busy_timeout = 1000")
        .execute(&pool)
        .await?;

    create_bucket(&pool, MODELS_BUCKET).await?;

    Ok(pool)
}

/// Create a bucket table if it does not exist yet
pub async fn create_bucket(pool: &SqlitePool, bucket: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{}" (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
        bucket
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// Drop a bucket table and everything in it
pub async fn drop_bucket(pool: &SqlitePool, bucket: &str) -> Result<()> {
    let sql = format!(r#"DROP TABLE IF EXISTS "{}""#, bucket);
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// Check whether a bucket table exists
pub async fn bucket_exists(pool: &SqlitePool, bucket: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(bucket)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
