//! Engine configuration for brickmap-xr
//!
//! Loaded from `brickmap-xr.toml` (every field optional, defaults in code) with
//! environment overrides for catalog API keys. The confidence tiers are
//! empirical and expected to be re-tuned, so they are configuration rather
//! than constants.

use brickmap_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment override for the primary catalog API key
pub const PRIMARY_API_KEY_ENV: &str = "BRICKMAP_PRIMARY_API_KEY";
/// Environment override for the secondary catalog API key
pub const SECONDARY_API_KEY_ENV: &str = "BRICKMAP_SECONDARY_API_KEY";

/// Default engine config file name inside the root folder
pub const ENGINE_CONFIG_FILE: &str = "brickmap-xr.toml";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub normalization: NormalizationConfig,
    pub catalogs: CatalogsConfig,
    pub materializer: MaterializerConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
}

// ============================================================================
// Matching
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub tiers: ConfidenceTiers,
    /// Run elimination again after fingerprint matching shrinks containers
    pub rerun_elimination: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tiers: ConfidenceTiers::default(),
            rerun_elimination: true,
        }
    }
}

/// Score thresholds and confidence slopes for fingerprint matches
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfidenceTiers {
    pub exact_threshold: f64,
    pub exact_confidence: f64,
    pub overlap_threshold: f64,
    pub overlap_slope: f64,
    pub fuzzy_threshold: f64,
    pub fuzzy_slope: f64,
    /// Minimum color-blind score that confirms a fuzzy match
    pub parts_only_threshold: f64,
}

impl Default for ConfidenceTiers {
    fn default() -> Self {
        Self {
            exact_threshold: 0.95,
            exact_confidence: 0.95,
            overlap_threshold: 0.8,
            overlap_slope: 0.75,
            fuzzy_threshold: 0.7,
            fuzzy_slope: 0.5,
            parts_only_threshold: 0.75,
        }
    }
}

impl ConfidenceTiers {
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("exact_threshold", self.exact_threshold),
            ("exact_confidence", self.exact_confidence),
            ("overlap_threshold", self.overlap_threshold),
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("parts_only_threshold", self.parts_only_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "matching.tiers.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.fuzzy_threshold <= self.overlap_threshold
            && self.overlap_threshold <= self.exact_threshold)
        {
            return Err(Error::Config(format!(
                "matching.tiers thresholds must satisfy fuzzy <= overlap <= exact (got {} / {} / {})",
                self.fuzzy_threshold, self.overlap_threshold, self.exact_threshold
            )));
        }

        if self.overlap_slope < 0.0 || self.fuzzy_slope < 0.0 {
            return Err(Error::Config(
                "matching.tiers slopes must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Part-id families collapsed before fingerprinting, per catalog
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub primary: NamespaceNormalization,
    pub secondary: NamespaceNormalization,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            primary: NamespaceNormalization {
                families: vec![PartFamily {
                    canonical: "970c00".to_string(),
                    members: vec!["73200".to_string(), "970c00".to_string()],
                }],
            },
            secondary: NamespaceNormalization {
                families: vec![PartFamily {
                    canonical: "970c00".to_string(),
                    members: vec!["970c00".to_string(), "970d00".to_string()],
                }],
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NamespaceNormalization {
    pub families: Vec<PartFamily>,
}

/// Cosmetic numbering variants of one physical component
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartFamily {
    pub canonical: String,
    pub members: Vec<String>,
}

// ============================================================================
// Catalog access
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogsConfig {
    pub primary: CatalogEndpoint,
    pub secondary: CatalogEndpoint,
    pub retry: RetryPolicy,
}

impl Default for CatalogsConfig {
    fn default() -> Self {
        Self {
            primary: CatalogEndpoint {
                base_url: "https://rebrickable.com/api/v3/lego".to_string(),
                container_path: "/sets/{id}/parts/".to_string(),
                entity_path: "/minifigs/{id}/parts/".to_string(),
                api_key: None,
            },
            secondary: CatalogEndpoint {
                base_url: "https://api.bricklink.com/api/store/v1".to_string(),
                container_path: "/items/SET/{id}/subsets".to_string(),
                entity_path: "/items/MINIFIG/{id}/subsets".to_string(),
                api_key: None,
            },
            retry: RetryPolicy::default(),
        }
    }
}

/// One catalog API; paths contain an `{id}` placeholder
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogEndpoint {
    pub base_url: String,
    pub container_path: String,
    pub entity_path: String,
    pub api_key: Option<String>,
}

/// Retry, backoff and timeout settings for catalog requests
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound on a server-requested `Retry-After` delay
    pub max_retry_after_ms: u64,
    pub request_timeout_ms: u64,
    pub requests_per_second: u32,
    pub max_pages: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 8000,
            max_retry_after_ms: 30_000,
            request_timeout_ms: 15_000,
            requests_per_second: 5,
            max_pages: 20,
        }
    }
}

impl RetryPolicy {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Delay to honor for a `Retry-After` header, clamped
    pub fn retry_after_delay(&self, requested: Duration) -> Duration {
        requested.min(Duration::from_millis(self.max_retry_after_ms))
    }

    /// Backoff before retry number `attempt` (1-based), doubling and capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

// ============================================================================
// Materializer, caches, database
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaterializerConfig {
    pub self_heal_timeout_ms: u64,
    /// Deadline for the live container listing, retries included
    pub container_fetch_timeout_ms: u64,
    /// Write successful self-heal fetches back to `entity_compositions`
    pub persist_self_heal: bool,
    /// Ask the primary catalog for the container when nothing is stored locally
    pub container_live_fallback: bool,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            self_heal_timeout_ms: 5000,
            container_fetch_timeout_ms: 10_000,
            persist_self_heal: true,
            container_live_fallback: true,
        }
    }
}

impl MaterializerConfig {
    pub fn self_heal_timeout(&self) -> Duration {
        Duration::from_millis(self.self_heal_timeout_ms)
    }

    pub fn container_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.container_fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub composition: CachePolicyConfig,
    pub identity: CachePolicyConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            composition: CachePolicyConfig {
                capacity: 2048,
                ttl_secs: 600,
            },
            identity: CachePolicyConfig {
                capacity: 8192,
                ttl_secs: 3600,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CachePolicyConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Total time mapping writes keep retrying on "database is locked"
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: 5000,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl EngineConfig {
    /// Load from TOML (missing file means defaults), apply env overrides, validate
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
            let parsed: EngineConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
            info!("Engine config loaded from {}", path.display());
            parsed
        } else {
            warn!(
                "Engine config {} not found, using built-in defaults",
                path.display()
            );
            EngineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Resolve API keys: environment over TOML
    pub fn apply_env_overrides(&mut self) {
        resolve_api_key(&mut self.catalogs.primary, PRIMARY_API_KEY_ENV);
        resolve_api_key(&mut self.catalogs.secondary, SECONDARY_API_KEY_ENV);
    }

    pub fn validate(&self) -> Result<()> {
        self.matching.tiers.validate()?;

        if self.cache.composition.capacity == 0 || self.cache.identity.capacity == 0 {
            return Err(Error::Config("cache capacity must be greater than zero".to_string()));
        }
        if self.catalogs.retry.requests_per_second == 0 {
            return Err(Error::Config(
                "catalogs.retry.requests_per_second must be greater than zero".to_string(),
            ));
        }
        if self.catalogs.retry.initial_backoff_ms > self.catalogs.retry.max_backoff_ms {
            return Err(Error::Config(
                "catalogs.retry.initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        for family in self
            .normalization
            .primary
            .families
            .iter()
            .chain(self.normalization.secondary.families.iter())
        {
            if family.canonical.trim().is_empty() {
                return Err(Error::Config(
                    "normalization family with empty canonical id".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn resolve_api_key(endpoint: &mut CatalogEndpoint, env_name: &str) {
    let env_key = std::env::var(env_name)
        .ok()
        .filter(|key| !key.trim().is_empty());
    let toml_key = endpoint.api_key.as_ref().filter(|key| !key.trim().is_empty());

    match (env_key, toml_key) {
        (Some(env_key), Some(_)) => {
            warn!(
                "{} set in both environment and TOML. Using environment.",
                env_name
            );
            endpoint.api_key = Some(env_key);
        }
        (Some(env_key), None) => {
            info!("{} loaded from environment", env_name);
            endpoint.api_key = Some(env_key);
        }
        (None, Some(_)) => {}
        (None, None) => endpoint.api_key = None,
    }
}
