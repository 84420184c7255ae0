//! Typed client for the web-unlocker scraping API with retry/backoff and
//! error classification.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::{info_span, warn};
use url::Url;

use hotlist_core::{MarketplaceListing, MarketplaceReview, SupplierOffer};

use crate::parse;

/// Hard ceiling on one batch-detail call, enforced before any network I/O.
pub const MAX_BATCH_URLS: usize = 10;

const BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http status {status} for {url}")]
    Http { status: u16, url: String },
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("response unusable: {0}")]
    Parse(String),
    #[error("scraping provider disabled or misconfigured")]
    Disabled,
}

impl ProviderError {
    /// Caller-side misuse must propagate to the caller instead of being
    /// absorbed by the fallback path.
    pub fn is_client_misuse(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub api_key: String,
    pub zone: String,
    pub enabled: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.brightdata.com".to_string(),
            api_key: String::new(),
            zone: String::new(),
            enabled: true,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("HOTLIST_SCRAPER_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("HOTLIST_SCRAPER_API_KEY").unwrap_or_default(),
            zone: std::env::var("HOTLIST_SCRAPER_ZONE").unwrap_or_default(),
            enabled: std::env::var("HOTLIST_SCRAPER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.enabled),
            connect_timeout: defaults.connect_timeout,
            read_timeout: defaults.read_timeout,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.enabled && !self.api_key.is_empty() && !self.zone.is_empty()
    }
}

/// One operation = one unlocker POST `{zone, url, format: "raw"}`, retried
/// per policy, body parsed as marketplace HTML.
pub struct ScrapeClient {
    http: reqwest::Client,
    config: ScrapeConfig,
    backoff: BackoffPolicy,
}

impl ScrapeClient {
    pub fn new(config: ScrapeConfig) -> anyhow::Result<Self> {
        Self::with_backoff(config, BackoffPolicy::default())
    }

    pub fn with_backoff(config: ScrapeConfig, backoff: BackoffPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            config,
            backoff,
        })
    }

    pub async fn search_listings(
        &self,
        keyword: &str,
        domain: &str,
    ) -> Result<Vec<MarketplaceListing>, ProviderError> {
        let host = marketplace_host(domain);
        let url = Url::parse_with_params(&format!("https://{host}/s"), [("k", keyword)])
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let html = self.unlock(url.as_str()).await?;
        parse::search_listings(&html, host)
    }

    pub async fn listing_detail(&self, item_id: &str) -> Result<MarketplaceListing, ProviderError> {
        if item_id.is_empty() {
            return Err(ProviderError::InvalidRequest("empty item id".to_string()));
        }
        let url = format!("https://www.amazon.com/dp/{item_id}");
        let html = self.unlock(&url).await?;
        parse::listing_detail(&html, item_id, &url)
    }

    pub async fn listing_reviews(
        &self,
        item_id: &str,
    ) -> Result<Vec<MarketplaceReview>, ProviderError> {
        if item_id.is_empty() {
            return Err(ProviderError::InvalidRequest("empty item id".to_string()));
        }
        let url = format!("https://www.amazon.com/product-reviews/{item_id}");
        let html = self.unlock(&url).await?;
        parse::listing_reviews(&html, item_id)
    }

    pub async fn search_supplier_offers(
        &self,
        keyword: &str,
    ) -> Result<Vec<SupplierOffer>, ProviderError> {
        let url = Url::parse_with_params(
            "https://s.1688.com/selloffer/offer_search.htm",
            [("keywords", keyword)],
        )
        .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let html = self.unlock(url.as_str()).await?;
        parse::supplier_offers(&html)
    }

    /// Fetch several detail pages. Oversized batches are rejected before any
    /// network call; failures of individual pages inside an accepted batch
    /// are logged and skipped.
    pub async fn batch_listing_details(
        &self,
        urls: &[String],
    ) -> Result<Vec<MarketplaceListing>, ProviderError> {
        if urls.len() > MAX_BATCH_URLS {
            return Err(ProviderError::InvalidRequest(format!(
                "batch of {} urls exceeds the limit of {MAX_BATCH_URLS}",
                urls.len()
            )));
        }

        let mut listings = Vec::new();
        for (index, url) in urls.iter().enumerate() {
            let Some(item_id) = parse::extract_item_id(url) else {
                warn!(url, "batch url carries no item id, skipping");
                continue;
            };
            if index > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
            match self.listing_detail(&item_id).await {
                Ok(listing) => listings.push(listing),
                Err(err) => warn!(url, %err, "batch detail fetch failed, skipping"),
            }
        }
        Ok(listings)
    }

    /// Raw page scrape through the unlocker, for callers doing their own
    /// extraction.
    pub async fn scrape_page(&self, url: &str) -> Result<String, ProviderError> {
        self.unlock(url).await
    }

    /// Health probe: can the unlocker currently reach the marketplace.
    pub async fn is_available(&self) -> bool {
        match self.unlock("https://www.amazon.com").await {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "scraping provider unavailable");
                false
            }
        }
    }

    async fn unlock(&self, target_url: &str) -> Result<String, ProviderError> {
        if !self.config.is_valid() {
            return Err(ProviderError::Disabled);
        }

        let endpoint = format!("{}/request", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "zone": self.config.zone,
            "url": target_url,
            "format": "raw",
        });

        let span = info_span!("provider_fetch", url = target_url);
        let _guard = span.enter();

        for attempt in 0..=self.backoff.max_retries {
            let result = self
                .http
                .post(&endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.text().await?);
                    }
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::Http {
                        status: status.as_u16(),
                        url: target_url.to_string(),
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::Request(err));
                }
            }
        }

        // The final attempt always returns above.
        unreachable!("retry loop exits on the last attempt")
    }
}

fn marketplace_host(domain: &str) -> &'static str {
    match domain.to_ascii_lowercase().as_str() {
        "amazon.co.uk" => "www.amazon.co.uk",
        "amazon.de" => "www.amazon.de",
        "amazon.co.jp" => "www.amazon.co.jp",
        _ => "www.amazon.com",
    }
}
