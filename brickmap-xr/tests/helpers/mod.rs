//! Shared fixtures for brickmap-xr integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use brickmap_xr::catalog::{CatalogClient, CatalogError};
use brickmap_xr::db;
use brickmap_xr::types::{Catalog, CompositionLine, MappingRecord};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Fresh in-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    brickmap_common::db::init_schema(&pool).await.unwrap();
    pool
}

/// Store a container's direct parts and primary minifigure membership
pub async fn seed_container(
    pool: &SqlitePool,
    container_id: &str,
    parts: &[CompositionLine],
    minifigs: &[(&str, u32)],
) {
    for line in parts {
        db::containers::insert_container_part(pool, container_id, line)
            .await
            .unwrap();
    }
    for (figure_id, quantity) in minifigs {
        db::containers::insert_container_member(pool, container_id, Catalog::Primary, figure_id, *quantity)
            .await
            .unwrap();
    }
}

pub async fn seed_members(pool: &SqlitePool, container_id: &str, catalog: Catalog, ids: &[&str]) {
    for id in ids {
        db::containers::insert_container_member(pool, container_id, catalog, id, 1)
            .await
            .unwrap();
    }
}

pub async fn seed_composition(pool: &SqlitePool, catalog: Catalog, entity_id: &str, lines: &[CompositionLine]) {
    db::compositions::replace_composition(pool, catalog, entity_id, lines)
        .await
        .unwrap();
}

pub async fn seed_mapping(pool: &SqlitePool, record: MappingRecord) {
    db::mappings::insert_mappings(pool, &[record]).await.unwrap();
}

/// Identity color table for the given ids
pub async fn seed_colors(pool: &SqlitePool, colors: &[(&str, &str)]) {
    for (primary, secondary) in colors {
        db::xref::upsert_color_xref(pool, primary, secondary).await.unwrap();
    }
}

/// Scripted behavior for one catalog lookup
#[derive(Debug, Clone)]
pub enum MockReply {
    Lines(Vec<CompositionLine>),
    Status(u16),
    /// Sleeps longer than any test timeout
    Hang,
}

/// Catalog client answering from a script and recording every call
#[derive(Default)]
pub struct MockCatalogClient {
    containers: HashMap<(Catalog, String), MockReply>,
    entities: HashMap<(Catalog, String), MockReply>,
    calls: Mutex<Vec<(Catalog, String)>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, catalog: Catalog, id: &str, reply: MockReply) -> Self {
        self.containers.insert((catalog, id.to_string()), reply);
        self
    }

    pub fn with_entity(mut self, catalog: Catalog, id: &str, reply: MockReply) -> Self {
        self.entities.insert((catalog, id.to_string()), reply);
        self
    }

    pub fn calls(&self) -> Vec<(Catalog, String)> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(
        &self,
        script: &HashMap<(Catalog, String), MockReply>,
        catalog: Catalog,
        id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        self.calls.lock().unwrap().push((catalog, id.to_string()));
        match script.get(&(catalog, id.to_string())) {
            Some(MockReply::Lines(lines)) => Ok(lines.clone()),
            Some(MockReply::Status(status)) => Err(CatalogError::Upstream {
                status: *status,
                message: "scripted failure".to_string(),
                retry_after: None,
            }),
            Some(MockReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            None => Err(CatalogError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn fetch_container_composition(
        &self,
        catalog: Catalog,
        container_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        self.answer(&self.containers, catalog, container_id).await
    }

    async fn fetch_entity_composition(
        &self,
        catalog: Catalog,
        entity_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        self.answer(&self.entities, catalog, entity_id).await
    }
}
