//! HTTP catalog client
//!
//! One client serves both catalogs. Every request waits on a shared
//! `governor` limiter, runs under a per-attempt timeout, and is retried on
//! 429/5xx and transport failures. A `Retry-After` header (seconds) overrides
//! the exponential backoff, up to `max_retry_after_ms`. Pagination only
//! follows `next` links on the endpoint's own origin.

use super::wire::decode_page;
use super::{CatalogClient, CatalogError};
use crate::config::{CatalogEndpoint, CatalogsConfig, RetryPolicy};
use crate::types::{clean_id, Catalog, CompositionLine};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{header, Client, StatusCode, Url};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Which endpoint template a lookup uses
#[derive(Debug, Clone, Copy)]
enum Resource {
    Container,
    Entity,
}

pub struct HttpCatalogClient {
    client: Client,
    primary: CatalogEndpoint,
    secondary: CatalogEndpoint,
    retry: RetryPolicy,
    rate_limiter: DirectLimiter,
}

impl HttpCatalogClient {
    pub fn new(config: &CatalogsConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(brickmap_common::config::get_user_agent())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CatalogError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(config.retry.requests_per_second).ok_or_else(|| {
            CatalogError::Validation("requests_per_second must be greater than zero".to_string())
        })?;

        Ok(Self {
            client,
            primary: config.primary.clone(),
            secondary: config.secondary.clone(),
            retry: config.retry.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn endpoint(&self, catalog: Catalog) -> &CatalogEndpoint {
        match catalog {
            Catalog::Primary => &self.primary,
            Catalog::Secondary => &self.secondary,
        }
    }

    fn url_for(&self, catalog: Catalog, resource: Resource, id: &str) -> Result<String, CatalogError> {
        let id = clean_id(id)
            .ok_or_else(|| CatalogError::Validation("empty identifier".to_string()))?;
        if id.contains(['/', '?', '#', ' ']) {
            return Err(CatalogError::Validation(format!(
                "identifier '{}' contains reserved characters",
                id
            )));
        }

        let endpoint = self.endpoint(catalog);
        let template = match resource {
            Resource::Container => &endpoint.container_path,
            Resource::Entity => &endpoint.entity_path,
        };
        Ok(format!(
            "{}{}",
            endpoint.base_url.trim_end_matches('/'),
            template.replace("{id}", id)
        ))
    }

    /// Single attempt: rate limit, send, read body, all under the request timeout
    async fn get_once(&self, catalog: Catalog, url: &str) -> Result<String, CatalogError> {
        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(url).header(header::ACCEPT, "application/json");
        if let Some(key) = &self.endpoint(catalog).api_key {
            request = request.header(header::AUTHORIZATION, format!("key {}", key));
        }

        let timeout = self.retry.request_timeout();
        let attempt = async {
            let response = request
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;
            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            if status == StatusCode::NOT_FOUND {
                return Err(CatalogError::NotFound(url.to_string()));
            }
            if !status.is_success() {
                return Err(CatalogError::Upstream {
                    status: status.as_u16(),
                    message: truncate(&body, 200),
                    retry_after,
                });
            }
            Ok(body)
        };

        tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| CatalogError::Timeout(timeout))?
    }

    /// Attempt plus retries for one page
    async fn get_with_retry(&self, catalog: Catalog, url: &str) -> Result<String, CatalogError> {
        let mut attempt = 0u32;
        loop {
            match self.get_once(catalog, url).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = match err.retry_after() {
                        Some(requested) => self.retry.retry_after_delay(requested),
                        None => self.retry.backoff_for(attempt),
                    };
                    warn!(
                        catalog = %catalog,
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Catalog request failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolve a `next` link against the current page URL
    ///
    /// Returns `None` when the link is malformed or points outside the
    /// endpoint's scheme, host and port.
    fn next_page_url(&self, catalog: Catalog, current: &str, next: &str) -> Option<String> {
        let base = Url::parse(&self.endpoint(catalog).base_url).ok()?;
        let resolved = Url::parse(current).ok()?.join(next).ok()?;
        (resolved.origin() == base.origin()).then(|| resolved.to_string())
    }

    /// Fetch every page of a listing, following `next` links up to `max_pages`
    async fn fetch_listing(
        &self,
        catalog: Catalog,
        resource: Resource,
        id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        let mut url = self.url_for(catalog, resource, id)?;
        let mut lines = Vec::new();
        let mut pages = 0u32;

        loop {
            let body = self.get_with_retry(catalog, &url).await?;
            let page = decode_page(&body).map_err(|e| CatalogError::Parse(e.to_string()))?;
            pages += 1;
            if page.unrecognized > 0 {
                debug!(
                    catalog = %catalog,
                    id = %id,
                    skipped = page.unrecognized,
                    "Skipped unrecognized listing entries"
                );
            }
            lines.extend(page.lines);

            match page.next {
                Some(next) if pages < self.retry.max_pages => {
                    match self.next_page_url(catalog, &url, &next) {
                        Some(resolved) => url = resolved,
                        None => {
                            warn!(
                                catalog = %catalog,
                                id = %id,
                                next = %next,
                                "Ignoring next link outside the catalog origin"
                            );
                            break;
                        }
                    }
                }
                Some(_) => {
                    warn!(
                        catalog = %catalog,
                        id = %id,
                        max_pages = self.retry.max_pages,
                        "Listing truncated at page limit"
                    );
                    break;
                }
                None => break,
            }
        }

        debug!(catalog = %catalog, id = %id, lines = lines.len(), pages, "Fetched listing");
        Ok(lines)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_container_composition(
        &self,
        catalog: Catalog,
        container_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        self.fetch_listing(catalog, Resource::Container, container_id).await
    }

    async fn fetch_entity_composition(
        &self,
        catalog: Catalog,
        entity_id: &str,
    ) -> Result<Vec<CompositionLine>, CatalogError> {
        self.fetch_listing(catalog, Resource::Entity, entity_id).await
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpCatalogClient {
        HttpCatalogClient::new(&CatalogsConfig::default()).unwrap()
    }

    #[test]
    fn test_url_templates() {
        let client = client();
        assert_eq!(
            client.url_for(Catalog::Primary, Resource::Container, "75192-1").unwrap(),
            "https://rebrickable.com/api/v3/lego/sets/75192-1/parts/"
        );
        assert_eq!(
            client.url_for(Catalog::Secondary, Resource::Entity, " sw0001 ").unwrap(),
            "https://api.bricklink.com/api/store/v1/items/MINIFIG/sw0001/subsets"
        );
    }

    #[test]
    fn test_url_rejects_bad_ids() {
        let client = client();
        assert!(matches!(
            client.url_for(Catalog::Primary, Resource::Entity, "  "),
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            client.url_for(Catalog::Primary, Resource::Entity, "../admin"),
            Err(CatalogError::Validation(_))
        ));
    }

    #[test]
    fn test_retry_after_seconds_only() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));

        headers.insert(
            header::RETRY_AFTER,
            header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_next_link_stays_on_origin() {
        let client = client();
        let current = "https://rebrickable.com/api/v3/lego/sets/75192-1/parts/";
        assert_eq!(
            client
                .next_page_url(Catalog::Primary, current, "?page=2")
                .as_deref(),
            Some("https://rebrickable.com/api/v3/lego/sets/75192-1/parts/?page=2")
        );
        assert!(client
            .next_page_url(Catalog::Primary, current, "https://rebrickable.com/api/v3/lego/sets/75192-1/parts/?page=3")
            .is_some());
        assert!(client
            .next_page_url(Catalog::Primary, current, "https://elsewhere.example/collect")
            .is_none());
        assert!(client
            .next_page_url(Catalog::Primary, current, "http://rebrickable.com/api/v3/lego/sets/75192-1/parts/?page=2")
            .is_none());
        assert!(client
            .next_page_url(Catalog::Primary, current, "https://rebrickable.com:8443/page2")
            .is_none());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut config = CatalogsConfig::default();
        config.retry.requests_per_second = 0;
        assert!(HttpCatalogClient::new(&config).is_err());
    }
}
