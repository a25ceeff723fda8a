//! Model record persistence
//!
//! Records live in the `models` bucket as JSON values keyed by model id.

use super::init::{create_bucket, drop_bucket, init_database, MODELS_BUCKET};
use crate::model::Model;
use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;

/// Key-value store of model records
#[derive(Debug, Clone)]
pub struct ModelStore {
    pool: SqlitePool,
}

impl ModelStore {
    /// Open the store file at `db_path`, creating it and the bucket if missing
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = init_database(db_path).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store a new record under its id
    pub async fn create(&self, model: &Model) -> Result<()> {
        self.update(model).await
    }

    /// Put a record under its id, replacing any existing value
    pub async fn update(&self, model: &Model) -> Result<()> {
        if model.id.is_empty() {
            return Err(Error::InvalidInput(format!(
                "model '{}' has no id",
                model.display_name
            )));
        }

        let value = serde_json::to_string(model)?;
        sqlx::query(
            r#"
            INSERT INTO models (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&model.id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load a record by id
    pub async fn inspect(&self, id: &str) -> Result<Model> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM models WHERE key = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(Error::NotFound(format!("model {}", id))),
        }
    }

    /// All records keyed by id
    pub async fn list(&self) -> Result<BTreeMap<String, Model>> {
        let rows = sqlx::query("SELECT key, value FROM models ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        let mut models = BTreeMap::new();
        for row in rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            let model: Model = serde_json::from_str(&value)?;
            models.insert(key, model);
        }

        Ok(models)
    }

    /// Remove a record; returns whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM models WHERE key = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop every record by recreating the bucket
    pub async fn truncate(&self) -> Result<()> {
        drop_bucket(&self.pool, MODELS_BUCKET).await?;
        create_bucket(&self.pool, MODELS_BUCKET).await
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM models")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
