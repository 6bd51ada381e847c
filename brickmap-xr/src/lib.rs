//! brickmap-xr library interface
//!
//! Cross-catalog entity resolution (matching pass) and container inventory
//! materialization, exposed for the binary and for integration tests.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod inventory;
pub mod matching;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, EngineError};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::CatalogClient;
use crate::config::EngineConfig;
use crate::inventory::Materializer;
use crate::matching::MatchingPass;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub materializer: Arc<Materializer>,
    pub matching: Arc<MatchingPass>,
    /// Held for the duration of a matching pass
    pub matching_lock: Arc<Mutex<()>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, client: Arc<dyn CatalogClient>, config: &EngineConfig) -> Self {
        Self {
            materializer: Arc::new(Materializer::new(db.clone(), client, config)),
            matching: Arc::new(MatchingPass::new(db.clone(), config)),
            matching_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            db,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::inventory_routes())
        .merge(api::matching_routes())
        .with_state(state)
}
