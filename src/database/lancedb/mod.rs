// LanceDB vector table module
// One table per sanitized tag; tables are derived views over the embedding
// cache and are rebuilt from it rather than migrated.

pub mod vector_store;

pub use vector_store::*;

use crate::database::sqlite::CacheRecord;
use serde::{Deserialize, Serialize};

/// One row of a per-tag vector table.
///
/// Field names are lowercase because the columnar store folds identifiers;
/// they are the wire-level column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub uuid: String,
    pub path: String,
    pub cachekey: String,
    pub vector: Vec<f32>,
}

impl From<&CacheRecord> for ChunkRow {
    #[inline]
    fn from(record: &CacheRecord) -> Self {
        Self {
            uuid: record.uuid.clone(),
            path: record.path.clone(),
            cachekey: record.cache_key.clone(),
            vector: record.vector.clone(),
        }
    }
}

/// A vector search hit: the row plus the store's reported distance.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchHit {
    pub uuid: String,
    pub path: String,
    pub cachekey: String,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_row_from_cache_record() {
        let record = CacheRecord {
            uuid: "u1".to_string(),
            cache_key: "k1".to_string(),
            path: "src/lib.rs".to_string(),
            artifact_id: "vectordb::p1".to_string(),
            vector: vec![0.1, 0.2],
            start_line: 1,
            end_line: 8,
            contents: "pub fn f() {}".to_string(),
        };

        let row = ChunkRow::from(&record);

        assert_eq!(row.uuid, "u1");
        assert_eq!(row.path, "src/lib.rs");
        assert_eq!(row.cachekey, "k1");
        assert_eq!(row.vector, vec![0.1, 0.2]);
    }
}
