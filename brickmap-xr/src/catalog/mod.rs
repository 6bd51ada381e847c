//! Catalog access
//!
//! [`CatalogClient`] is the seam between the engine and the two product
//! catalog APIs. The engine only ever sees canonical [`CompositionLine`]s;
//! upstream response shapes are resolved in [`wire`].

pub mod http_client;
pub mod wire;

pub use http_client::HttpCatalogClient;

use crate::types::{Catalog, CompositionLine};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Identifier rejected before any request was made
    #[error("Invalid identifier: {0}")]
    Validation(String),

    /// Upstream says the container or entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success status from the catalog API
    #[error("Upstream error {status}: {message}")]
    Upstream {
        status: u16,
        message: String,
        /// Server-requested delay before retrying
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Rate limiting, server errors and transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Upstream { status, .. } => *status == 429 || (500..600).contains(status),
            CatalogError::Network(_) | CatalogError::Timeout(_) => true,
            CatalogError::Validation(_) | CatalogError::NotFound(_) | CatalogError::Parse(_) => {
                false
            }
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::Upstream { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// On-demand composition lookups against a product catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Direct contents of a container: parts and minifigure references
    async fn fetch_container_composition(
        &self,
        catalog: Catalog,
        container_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError>;

    /// Parts of one minifigure
    async fn fetch_entity_composition(
        &self,
        catalog: Catalog,
        entity_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError>;
}
