//! Minifigure compositions (`entity_compositions`)

use super::{row_quantity, BATCH_CHUNK};
use crate::matching::CompositionIndex;
use crate::types::{Catalog, CompositionLine, ItemKind};
use brickmap_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

fn line_from_row(row: &SqliteRow) -> CompositionLine {
    CompositionLine {
        item_id: row.get("part_id"),
        color_id: row.get("color_id"),
        quantity: row_quantity(row),
        kind: ItemKind::Part,
        name: row.get("part_name"),
    }
}

/// Compositions for a list of entity ids in one catalog
///
/// Entities with nothing stored are absent from the returned map.
pub async fn load_compositions(
    pool: &SqlitePool,
    catalog: Catalog,
    entity_ids: &[String],
) -> Result<HashMap<String, Vec<CompositionLine>>> {
    let mut compositions: HashMap<String, Vec<CompositionLine>> = HashMap::new();

    for chunk in entity_ids.chunks(BATCH_CHUNK) {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT entity_id, part_id, color_id, quantity, part_name \
             FROM entity_compositions WHERE catalog = ",
        );
        query.push_bind(catalog.as_str());
        query.push(" AND entity_id IN (");
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(") ORDER BY entity_id, id");

        let rows = query.build().fetch_all(pool).await?;
        for row in &rows {
            let entity_id: String = row.get("entity_id");
            compositions.entry(entity_id).or_default().push(line_from_row(row));
        }
    }

    Ok(compositions)
}

/// Every stored composition, both catalogs
pub async fn load_composition_index(pool: &SqlitePool) -> Result<CompositionIndex> {
    let rows = sqlx::query(
        r#"
        SELECT catalog, entity_id, part_id, color_id, quantity, part_name
        FROM entity_compositions
        ORDER BY catalog, entity_id, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut index = CompositionIndex::new();
    for row in &rows {
        let catalog: String = row.get("catalog");
        let Ok(catalog) = catalog.parse::<Catalog>() else {
            continue;
        };
        let entity_id: String = row.get("entity_id");
        index.insert(catalog, &entity_id, line_from_row(row));
    }

    debug!(
        primary = index.entity_count(Catalog::Primary),
        secondary = index.entity_count(Catalog::Secondary),
        "Loaded composition index"
    );
    Ok(index)
}

/// Replace an entity's stored composition in one transaction
pub async fn replace_composition(
    pool: &SqlitePool,
    catalog: Catalog,
    entity_id: &str,
    lines: &[CompositionLine],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM entity_compositions WHERE catalog = ? AND entity_id = ?")
        .bind(catalog.as_str())
        .bind(entity_id)
        .execute(&mut *tx)
        .await?;

    for line in lines.iter().filter(|line| line.kind == ItemKind::Part) {
        sqlx::query(
            r#"
            INSERT INTO entity_compositions (catalog, entity_id, part_id, color_id, quantity, part_name)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(catalog.as_str())
        .bind(entity_id)
        .bind(&line.item_id)
        .bind(line.color_id.as_deref())
        .bind(i64::from(line.quantity))
        .bind(line.name.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
