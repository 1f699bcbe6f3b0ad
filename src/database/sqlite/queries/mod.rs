#[cfg(test)]
mod tests;

use super::models::{CacheRecord, CacheRow};
use anyhow::{Context, Result};
use sqlx::SqlitePool;

pub struct CacheQueries;

impl CacheQueries {
    /// Insert one record by primary key. The cache is append-mostly: existing
    /// rows are never updated, only deleted by
    /// [`delete_by_key`](Self::delete_by_key).
    pub async fn insert(pool: &SqlitePool, record: &CacheRecord) -> Result<()> {
        let vector = CacheRecord::encode_vector(&record.vector)?;

        sqlx::query(
            "INSERT INTO lance_db_cache \
             (uuid, cacheKey, path, artifact_id, vector, startLine, endLine, contents) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uuid)
        .bind(&record.cache_key)
        .bind(&record.path)
        .bind(&record.artifact_id)
        .bind(&vector)
        .bind(record.start_line)
        .bind(record.end_line)
        .bind(&record.contents)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to insert cache record {}", record.uuid))?;

        Ok(())
    }

    /// All chunks of one file version under one artifact, used to rebuild a
    /// tag's rows without recomputing embeddings.
    pub async fn select_by_key(
        pool: &SqlitePool,
        artifact_id: &str,
        cache_key: &str,
        path: &str,
    ) -> Result<Vec<CacheRecord>> {
        let rows = sqlx::query_as::<_, CacheRow>(
            "SELECT uuid, cacheKey, path, artifact_id, vector, startLine, endLine, contents \
             FROM lance_db_cache \
             WHERE artifact_id = ? AND cacheKey = ? AND path = ?",
        )
        .bind(artifact_id)
        .bind(cache_key)
        .bind(path)
        .fetch_all(pool)
        .await
        .context("Failed to select cache records by key")?;

        rows.into_iter().map(CacheRecord::try_from).collect()
    }

    /// Records for the given uuids, in no particular order. Used to join
    /// vector search hits back to chunk text.
    pub async fn select_by_uuids(
        pool: &SqlitePool,
        uuids: &[String],
    ) -> Result<Vec<CacheRecord>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = sqlx::QueryBuilder::new(
            "SELECT uuid, cacheKey, path, artifact_id, vector, startLine, endLine, contents \
             FROM lance_db_cache WHERE uuid IN (",
        );
        let mut separated = builder.separated(", ");
        for uuid in uuids {
            separated.push_bind(uuid);
        }
        builder.push(")");

        let rows = builder
            .build_query_as::<CacheRow>()
            .fetch_all(pool)
            .await
            .context("Failed to select cache records by uuid")?;

        rows.into_iter().map(CacheRecord::try_from).collect()
    }

    /// Remove every chunk of one file version under one artifact.
    pub async fn delete_by_key(
        pool: &SqlitePool,
        artifact_id: &str,
        cache_key: &str,
        path: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM lance_db_cache \
             WHERE artifact_id = ? AND cacheKey = ? AND path = ?",
        )
        .bind(artifact_id)
        .bind(cache_key)
        .bind(path)
        .execute(pool)
        .await
        .context("Failed to delete cache records")?;

        Ok(result.rows_affected())
    }
}
