
use super::{ChunkRow, VectorSearchHit};
use crate::IndexError;
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Store of per-tag vector tables.
///
/// Tables are created lazily on the first non-empty insert, with the vector
/// dimension taken from the inserted rows, and are never dropped here.
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    #[inline]
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        std::fs::create_dir_all(path).map_err(|e| {
            IndexError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let connection = lancedb::connect(path.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self { connection })
    }

    #[inline]
    pub async fn table_names(&self) -> Result<Vec<String>, IndexError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to list tables: {}", e)))
    }

    #[inline]
    pub async fn has_table(&self, table_name: &str) -> Result<bool, IndexError> {
        Ok(self.table_names().await?.iter().any(|t| t == table_name))
    }

    /// Append rows to the named table, creating it when absent.
    ///
    /// An empty `rows` is a no-op: no table is created for it. Rows are never
    /// deduplicated; retrying a successful add duplicates them.
    pub async fn add_rows(&self, table_name: &str, rows: &[ChunkRow]) -> Result<(), IndexError> {
        if rows.is_empty() {
            debug!("No rows to add to table {}", table_name);
            return Ok(());
        }

        let batch = Self::rows_to_batch(rows)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        if self.has_table(table_name).await? {
            let table = self
                .connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| IndexError::Database(format!("Failed to open table: {}", e)))?;

            table
                .add(reader)
                .execute()
                .await
                .map_err(|e| IndexError::Database(format!("Failed to insert rows: {}", e)))?;
        } else {
            self.connection
                .create_table(table_name, reader)
                .execute()
                .await
                .map_err(|e| IndexError::Database(format!("Failed to create table: {}", e)))?;

            info!("Created vector table {}", table_name);
        }

        debug!("Added {} rows to table {}", rows.len(), table_name);
        Ok(())
    }

    /// Delete every row of one file version from the named table.
    ///
    /// `cachekey` and `path` originate from the workspace and are rendered as
    /// quoted literals; embedded quotes are doubled so they cannot break the
    /// predicate grammar.
    pub async fn delete_where(
        &self,
        table_name: &str,
        cache_key: &str,
        path: &str,
    ) -> Result<(), IndexError> {
        let table = self
            .connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to open table: {}", e)))?;

        let predicate = format!(
            "cachekey = '{}' AND path = '{}'",
            escape_literal(cache_key),
            escape_literal(path)
        );

        table
            .delete(&predicate)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to delete rows: {}", e)))?;

        debug!("Deleted rows from {} where {}", table_name, predicate);
        Ok(())
    }

    /// Nearest-neighbor search over one table, optionally post-filtered to
    /// paths under a directory prefix.
    pub async fn search(
        &self,
        table_name: &str,
        query_vector: &[f32],
        limit: usize,
        path_prefix: Option<&str>,
    ) -> Result<Vec<VectorSearchHit>, IndexError> {
        let table = self
            .connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to open table: {}", e)))?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| IndexError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(limit);

        if let Some(prefix) = path_prefix {
            query = query.only_if(format!("path LIKE '{}%'", escape_literal(prefix)));
        }

        let mut stream = query
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Search over {} returned {} hits", table_name, hits.len());
        Ok(hits)
    }

    /// Row count, mostly useful to tests and diagnostics.
    #[inline]
    pub async fn count_rows(&self, table_name: &str) -> Result<usize, IndexError> {
        let table = self
            .connection
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| IndexError::Database(format!("Failed to open table: {}", e)))?;

        table
            .count_rows(None)
            .await
            .map_err(|e| IndexError::Database(format!("Failed to count rows: {}", e)))
    }

    fn schema_for_dim(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("uuid", DataType::Utf8, false),
            Field::new("path", DataType::Utf8, false),
            Field::new("cachekey", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
        ]))
    }

    fn rows_to_batch(rows: &[ChunkRow]) -> Result<RecordBatch, IndexError> {
        let vector_dim = rows[0].vector.len();
        let schema = Self::schema_for_dim(vector_dim);

        let uuids: Vec<&str> = rows.iter().map(|r| r.uuid.as_str()).collect();
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        let cache_keys: Vec<&str> = rows.iter().map(|r| r.cachekey.as_str()).collect();

        let mut flat_values = Vec::with_capacity(rows.len() * vector_dim);
        for row in rows {
            flat_values.extend_from_slice(&row.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    IndexError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(uuids)),
            Arc::new(StringArray::from(paths)),
            Arc::new(StringArray::from(cache_keys)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| IndexError::Database(format!("Failed to create record batch: {}", e)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorSearchHit>, IndexError> {
        let uuids = batch
            .column_by_name("uuid")
            .ok_or_else(|| IndexError::Database("Missing uuid column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| IndexError::Database("Invalid uuid column type".to_string()))?;

        let paths = batch
            .column_by_name("path")
            .ok_or_else(|| IndexError::Database("Missing path column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| IndexError::Database("Invalid path column type".to_string()))?;

        let cache_keys = batch
            .column_by_name("cachekey")
            .ok_or_else(|| IndexError::Database("Missing cachekey column".to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| IndexError::Database("Invalid cachekey column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| IndexError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| IndexError::Database("Invalid _distance column type".to_string()))?;

        let mut hits = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            hits.push(VectorSearchHit {
                uuid: uuids.value(row).to_string(),
                path: paths.value(row).to_string(),
                cachekey: cache_keys.value(row).to_string(),
                distance: if distances.is_null(row) {
                    0.0
                } else {
                    distances.value(row)
                },
            });
        }

        Ok(hits)
    }
}

/// Render a value safe for use inside a single-quoted predicate literal.
#[inline]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
