// Storage layer: the durable SQLite embedding cache (system of record) and
// the per-tag LanceDB vector tables (derived views, cheap to rebuild).

pub mod lancedb;
pub mod sqlite;
