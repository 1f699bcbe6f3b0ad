use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::{debug, info};

pub mod models;
pub mod queries;


pub use models::*;
pub use queries::*;

pub type DbPool = Pool<Sqlite>;

/// Name of the durable embedding cache table.
pub const CACHE_TABLE: &str = "lance_db_cache";

/// Handle over the durable embedding cache.
///
/// Opened once per process; migrations are applied at open. The underlying
/// pool is safe for concurrent inserts keyed by distinct uuids, which is what
/// updates over different tags sharing an artifact produce.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    pool: DbPool,
}

impl EmbeddingCache {
    #[inline]
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let cache = Self { pool };
        cache.run_migrations().await?;

        Ok(cache)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running embedding cache migrations");

        sqlx::raw_sql(include_str!("migrations/001_initial_schema.sql"))
            .execute(&self.pool)
            .await
            .context("Failed to run initial schema migration")?;

        if !self.has_artifact_column().await? {
            sqlx::raw_sql(include_str!("migrations/002_add_artifact_id.sql"))
                .execute(&self.pool)
                .await
                .context("Failed to add artifact_id column")?;
        }

        debug!("Embedding cache migrations completed successfully");
        Ok(())
    }

    async fn has_artifact_column(&self) -> Result<bool> {
        let columns = sqlx::query(&format!("PRAGMA table_info({CACHE_TABLE})"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to inspect cache table schema")?;

        Ok(columns
            .iter()
            .any(|row| row.get::<String, _>("name") == "artifact_id"))
    }
}
