
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One chunk of one file version, as persisted in the embedding cache.
///
/// All records sharing `(artifact_id, cache_key, path)` were produced by a
/// single compute step and together form the complete chunk set for that file
/// version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub uuid: String,
    pub cache_key: String,
    pub path: String,
    pub artifact_id: String,
    pub vector: Vec<f32>,
    pub start_line: i64,
    pub end_line: i64,
    pub contents: String,
}

/// Raw row shape of `lance_db_cache`; the vector is stored as JSON text.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct CacheRow {
    pub uuid: String,
    #[sqlx(rename = "cacheKey")]
    pub cache_key: String,
    pub path: String,
    pub artifact_id: String,
    pub vector: String,
    #[sqlx(rename = "startLine")]
    pub start_line: i64,
    #[sqlx(rename = "endLine")]
    pub end_line: i64,
    pub contents: String,
}

impl CacheRecord {
    /// Textual form of a float sequence for the `vector` column.
    #[inline]
    pub fn encode_vector(vector: &[f32]) -> Result<String> {
        serde_json::to_string(vector).context("Failed to serialize vector")
    }

    #[inline]
    pub fn decode_vector(text: &str) -> Result<Vec<f32>> {
        serde_json::from_str(text).context("Failed to parse stored vector")
    }
}

impl TryFrom<CacheRow> for CacheRecord {
    type Error = anyhow::Error;

    fn try_from(row: CacheRow) -> Result<Self> {
        let vector = CacheRecord::decode_vector(&row.vector)
            .with_context(|| format!("Corrupt vector for cache record {}", row.uuid))?;

        Ok(Self {
            uuid: row.uuid,
            cache_key: row.cache_key,
            path: row.path,
            artifact_id: row.artifact_id,
            vector,
            start_line: row.start_line,
            end_line: row.end_line,
            contents: row.contents,
        })
    }
}
