//! Part and color cross-reference tables

use super::BATCH_CHUNK;
use crate::matching::TranslationTables;
use brickmap_common::Result;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

/// Full tables, used by the matching pass
pub async fn load_translation_tables(pool: &SqlitePool) -> Result<TranslationTables> {
    let part_rows = sqlx::query("SELECT primary_part_id, secondary_part_id FROM part_xref")
        .fetch_all(pool)
        .await?;
    let parts = part_rows
        .iter()
        .map(|row| (row.get("primary_part_id"), row.get("secondary_part_id")))
        .collect();

    Ok(TranslationTables::new(parts, load_color_xref(pool).await?))
}

/// The color table is small; always loaded whole
pub async fn load_color_xref(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows = sqlx::query("SELECT primary_color_id, secondary_color_id FROM color_xref")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("primary_color_id"), row.get("secondary_color_id")))
        .collect())
}

/// Part cross-references for a list of primary part ids
pub async fn load_part_xref(
    pool: &SqlitePool,
    primary_part_ids: &[String],
) -> Result<HashMap<String, String>> {
    let mut xref = HashMap::new();

    for chunk in primary_part_ids.chunks(BATCH_CHUNK) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT primary_part_id, secondary_part_id FROM part_xref WHERE primary_part_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        for row in query.build().fetch_all(pool).await? {
            xref.insert(row.get("primary_part_id"), row.get("secondary_part_id"));
        }
    }

    Ok(xref)
}

pub async fn upsert_part_xref(pool: &SqlitePool, primary: &str, secondary: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO part_xref (primary_part_id, secondary_part_id) VALUES (?, ?)
        ON CONFLICT(primary_part_id) DO UPDATE SET secondary_part_id = excluded.secondary_part_id
        "#,
    )
    .bind(primary)
    .bind(secondary)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn upsert_color_xref(pool: &SqlitePool, primary: &str, secondary: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO color_xref (primary_color_id, secondary_color_id) VALUES (?, ?)
        ON CONFLICT(primary_color_id) DO UPDATE SET secondary_color_id = excluded.secondary_color_id
        "#,
    )
    .bind(primary)
    .bind(secondary)
    .execute(pool)
    .await?;

    Ok(())
}
