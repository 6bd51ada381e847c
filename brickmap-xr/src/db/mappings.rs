//! Minifigure mapping persistence
//!
//! `minifig_mappings` is append-only. Inserts never overwrite: a conflict on
//! either UNIQUE column leaves the existing link in place and is counted.

use super::BATCH_CHUNK;
use crate::types::{MappingRecord, MatchMethod};
use brickmap_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::warn;

/// Result of an insert batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingWriteOutcome {
    pub inserted: usize,
    /// Records skipped because either id was already mapped
    pub conflicts: usize,
}

fn mapping_from_row(row: &SqliteRow) -> Result<MappingRecord> {
    let method: String = row.get("method");
    let method: MatchMethod = method.parse().map_err(Error::Internal)?;
    let matched_at: String = row.get("matched_at");
    let matched_at = DateTime::parse_from_rfc3339(&matched_at)
        .map_err(|e| Error::Internal(format!("Invalid matched_at '{}': {}", matched_at, e)))?
        .with_timezone(&Utc);

    Ok(MappingRecord {
        primary_id: row.get("primary_id"),
        secondary_id: row.get("secondary_id"),
        confidence: row.get("confidence"),
        method,
        matched_at,
    })
}

/// Rows that fail to decode are logged and left out
fn collect_mappings(rows: Vec<SqliteRow>) -> Vec<MappingRecord> {
    rows.iter()
        .filter_map(|row| match mapping_from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable mapping row: {}", e);
                None
            }
        })
        .collect()
}

pub async fn load_all_mappings(pool: &SqlitePool) -> Result<Vec<MappingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT primary_id, secondary_id, confidence, method, matched_at
        FROM minifig_mappings
        ORDER BY primary_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(collect_mappings(rows))
}

/// Mappings for a set of primary figure ids, keyed by primary id
pub async fn load_mappings_for_primary(
    pool: &SqlitePool,
    primary_ids: &[String],
) -> Result<HashMap<String, MappingRecord>> {
    let mut mappings = HashMap::new();

    for chunk in primary_ids.chunks(BATCH_CHUNK) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT primary_id, secondary_id, confidence, method, matched_at \
             FROM minifig_mappings WHERE primary_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(pool).await?;
        for record in collect_mappings(rows) {
            mappings.insert(record.primary_id.clone(), record);
        }
    }

    Ok(mappings)
}

/// Insert-or-ignore a batch of records in one transaction
pub async fn insert_mappings(
    pool: &SqlitePool,
    records: &[MappingRecord],
) -> Result<MappingWriteOutcome> {
    let mut outcome = MappingWriteOutcome::default();
    if records.is_empty() {
        return Ok(outcome);
    }

    let mut tx = pool.begin().await?;
    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO minifig_mappings (primary_id, secondary_id, confidence, method, matched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&record.primary_id)
        .bind(&record.secondary_id)
        .bind(record.confidence)
        .bind(record.method.as_str())
        .bind(record.matched_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            outcome.inserted += 1;
        } else {
            outcome.conflicts += 1;
        }
    }
    tx.commit().await?;

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    #[tokio::test]
    async fn test_insert_and_load() {
        let pool = memory_pool().await;
        let records = vec![
            MappingRecord::new("fig-2", "sw0002", 0.8, MatchMethod::Overlap),
            MappingRecord::new("fig-1", "sw0001", 1.0, MatchMethod::Elimination),
        ];
        let outcome = insert_mappings(&pool, &records).await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.conflicts, 0);

        let loaded = load_all_mappings(&pool).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].primary_id, "fig-1");
        assert_eq!(loaded[0].method, MatchMethod::Elimination);
        assert_eq!(loaded[1].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_conflicts_never_overwrite() {
        let pool = memory_pool().await;
        insert_mappings(&pool, &[MappingRecord::new("fig-1", "sw0001", 1.0, MatchMethod::Elimination)])
            .await
            .unwrap();

        let outcome = insert_mappings(
            &pool,
            &[
                MappingRecord::new("fig-1", "sw0009", 0.95, MatchMethod::Exact),
                MappingRecord::new("fig-9", "sw0001", 0.95, MatchMethod::Exact),
            ],
        )
        .await
        .unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.conflicts, 2);

        let loaded = load_all_mappings(&pool).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].secondary_id, "sw0001");
    }

    #[tokio::test]
    async fn test_load_for_primary_batches() {
        let pool = memory_pool().await;
        let records: Vec<_> = (0..1200)
            .map(|i| {
                MappingRecord::new(
                    format!("fig-{}", i),
                    format!("sw{:04}", i),
                    1.0,
                    MatchMethod::Elimination,
                )
            })
            .collect();
        insert_mappings(&pool, &records).await.unwrap();

        let ids: Vec<String> = (0..1200).step_by(2).map(|i| format!("fig-{}", i)).collect();
        let loaded = load_mappings_for_primary(&pool, &ids).await.unwrap();
        assert_eq!(loaded.len(), 600);
        assert_eq!(loaded["fig-1198"].secondary_id, "sw1198");
    }
}
