//! Container membership and direct part rows

use super::row_quantity;
use crate::matching::CoOccurrenceIndex;
use crate::types::{Catalog, CompositionLine};
use brickmap_common::Result;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Co-occurrence index over every stored container
///
/// Returns the index and the number of rows rejected for blank identifiers
/// or an unknown catalog.
pub async fn load_cooccurrence(pool: &SqlitePool) -> Result<(CoOccurrenceIndex, usize)> {
    let rows = sqlx::query(
        r#"
        SELECT container_id, catalog, entity_id
        FROM container_members
        ORDER BY container_id, catalog, entity_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut index = CoOccurrenceIndex::new();
    let mut rejected = 0;
    for row in &rows {
        let container_id: String = row.get("container_id");
        let catalog: String = row.get("catalog");
        let entity_id: String = row.get("entity_id");

        let inserted = match catalog.parse::<Catalog>() {
            Ok(catalog) => index.insert(&container_id, catalog, &entity_id),
            Err(_) => false,
        };
        if !inserted {
            debug!(
                container_id = %container_id,
                entity_id = %entity_id,
                "Rejected co-occurrence row"
            );
            rejected += 1;
        }
    }

    Ok((index, rejected))
}

/// Minifigure parent lines of one container in one catalog
pub async fn load_container_minifigs(
    pool: &SqlitePool,
    container_id: &str,
    catalog: Catalog,
) -> Result<Vec<CompositionLine>> {
    let rows = sqlx::query(
        r#"
        SELECT entity_id, quantity
        FROM container_members
        WHERE container_id = ? AND catalog = ?
        ORDER BY entity_id
        "#,
    )
    .bind(container_id)
    .bind(catalog.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CompositionLine::minifig(row.get::<String, _>("entity_id"), row_quantity(row)))
        .collect())
}

/// Direct primary-namespace part rows of one container, in stored order
pub async fn load_container_parts(
    pool: &SqlitePool,
    container_id: &str,
) -> Result<Vec<CompositionLine>> {
    let rows = sqlx::query(
        r#"
        SELECT part_id, color_id, quantity, part_name
        FROM container_parts
        WHERE container_id = ?
        ORDER BY id
        "#,
    )
    .bind(container_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let mut line = CompositionLine::part(
                row.get::<String, _>("part_id"),
                String::new(),
                row_quantity(row),
            );
            line.color_id = row.get("color_id");
            line.name = row.get("part_name");
            line
        })
        .collect())
}

pub async fn insert_container_member(
    pool: &SqlitePool,
    container_id: &str,
    catalog: Catalog,
    entity_id: &str,
    quantity: u32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO container_members (container_id, catalog, entity_id, quantity)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(container_id, catalog, entity_id) DO UPDATE SET quantity = excluded.quantity
        "#,
    )
    .bind(container_id)
    .bind(catalog.as_str())
    .bind(entity_id)
    .bind(i64::from(quantity))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_container_part(
    pool: &SqlitePool,
    container_id: &str,
    line: &CompositionLine,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO container_parts (container_id, part_id, color_id, quantity, part_name)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(container_id)
    .bind(&line.item_id)
    .bind(line.color_id.as_deref())
    .bind(i64::from(line.quantity))
    .bind(line.name.as_deref())
    .execute(pool)
    .await?;

    Ok(())
}
