//! Database initialization
//!
//! Creates the catalog, cross-reference and mapping tables on first run.
//! Every statement is idempotent so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets materialization reads proceed while a matching pass writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables on an already-open pool
///
/// Used directly by tests against `sqlite::memory:` pools.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_container_members_table(pool).await?;
    create_container_parts_table(pool).await?;
    create_entity_compositions_table(pool).await?;
    create_part_xref_table(pool).await?;
    create_color_xref_table(pool).await?;
    create_minifig_mappings_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    info!("Database tables initialized (schema version {})", SCHEMA_VERSION);
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Minifigure membership of each container, per catalog
async fn create_container_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS container_members (
            container_id TEXT NOT NULL,
            catalog TEXT NOT NULL CHECK (catalog IN ('primary', 'secondary')),
            entity_id TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 0),
            PRIMARY KEY (container_id, catalog, entity_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_container_members_entity ON container_members(catalog, entity_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Direct part rows of a container (primary namespace)
async fn create_container_parts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS container_parts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            container_id TEXT NOT NULL,
            part_id TEXT NOT NULL,
            color_id TEXT,
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            part_name TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_container_parts_container ON container_parts(container_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Pre-materialized minifigure subparts in either namespace
async fn create_entity_compositions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entity_compositions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog TEXT NOT NULL CHECK (catalog IN ('primary', 'secondary')),
            entity_id TEXT NOT NULL,
            part_id TEXT NOT NULL,
            color_id TEXT,
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            part_name TEXT,
            fetched_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entity_compositions_entity ON entity_compositions(catalog, entity_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_part_xref_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS part_xref (
            primary_part_id TEXT PRIMARY KEY,
            secondary_part_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_color_xref_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS color_xref (
            primary_color_id TEXT PRIMARY KEY,
            secondary_color_id TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Cross-catalog minifigure links; 1:1 on both sides, append-only
async fn create_minifig_mappings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS minifig_mappings (
            primary_id TEXT NOT NULL UNIQUE,
            secondary_id TEXT NOT NULL UNIQUE,
            confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
            method TEXT NOT NULL,
            matched_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
