//! Store access for brickmap-xr
//!
//! Repository functions over the tables created by
//! `brickmap_common::db::init_schema`. Lookups keyed by id lists are batched
//! into chunked `IN (...)` queries.

pub mod compositions;
pub mod containers;
pub mod mappings;
pub mod xref;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Bind parameters per `IN (...)` query; well under SQLite's variable limit
pub(crate) const BATCH_CHUNK: usize = 500;

/// Stored quantities are non-negative INTEGERs; clamp into `u32`
pub(crate) fn row_quantity(row: &SqliteRow) -> u32 {
    let quantity: i64 = row.get("quantity");
    u32::try_from(quantity.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Single-connection in-memory database with the full schema
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        brickmap_common::db::init_schema(&pool).await.unwrap();
        pool
    }
}
