//! Tests for database initialization
//!
//! Covers first-run creation, reopening an existing database, and the
//! uniqueness constraints the mapping table relies on.

use brickmap_common::db::init::{init_database, init_schema, SCHEMA_VERSION};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("brickmap.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("brickmap.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[tokio::test]
async fn test_all_tables_created() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    for table in [
        "container_members",
        "container_parts",
        "entity_compositions",
        "part_xref",
        "color_xref",
        "minifig_mappings",
    ] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_mapping_table_is_one_to_one() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let insert = "INSERT INTO minifig_mappings (primary_id, secondary_id, confidence, method, matched_at) \
                  VALUES (?, ?, 1.0, 'elimination', '2026-01-01T00:00:00Z')";

    sqlx::query(insert).bind("fig-1").bind("sw0001").execute(&pool).await.unwrap();

    let dup_primary = sqlx::query(insert).bind("fig-1").bind("sw0002").execute(&pool).await;
    assert!(dup_primary.is_err(), "second mapping for a primary id must be rejected");

    let dup_secondary = sqlx::query(insert).bind("fig-2").bind("sw0001").execute(&pool).await;
    assert!(dup_secondary.is_err(), "second mapping for a secondary id must be rejected");
}

#[tokio::test]
async fn test_init_schema_is_idempotent() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    init_schema(&pool).await.unwrap();
    init_schema(&pool).await.unwrap();

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}
