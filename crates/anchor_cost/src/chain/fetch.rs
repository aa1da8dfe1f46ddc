//! Rate-limited HTTP GET core shared by the explorer clients.

use crate::chain::cache::{Cache, CacheError};
use crate::chain::limiter::RateLimiter;
use crate::chain::normalize::NormalizeError;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_RATE_PER_SEC: u32 = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ETHERSCAN_URL: &str = "https://api.etherscan.io/api";
pub const BLOCKCHAIN_INFO_URL: &str = "https://blockchain.info";

#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Cache namespace and log label.
    pub provider: String,
    pub base_url: String,
    pub requests_per_second: u32,
    pub burst: u32,
    /// Serve only from cache; never touch the network.
    pub offline: bool,
}

impl FetchConfig {
    pub fn etherscan() -> Self {
        Self {
            provider: "etherscan".to_string(),
            base_url: ETHERSCAN_URL.to_string(),
            requests_per_second: DEFAULT_RATE_PER_SEC,
            burst: 1,
            offline: false,
        }
    }

    pub fn blockchain_info() -> Self {
        Self {
            provider: "blockchain.info".to_string(),
            base_url: BLOCKCHAIN_INFO_URL.to_string(),
            requests_per_second: DEFAULT_RATE_PER_SEC,
            burst: 1,
            offline: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("normalize: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("negative fee for {txid}: inputs {inputs} < outputs {outputs}")]
    NegativeFee {
        txid: String,
        inputs: u64,
        outputs: u64,
    },
    #[error("offline mode: no cached response for {0}")]
    OfflineMiss(String),
}

/// One upstream provider: HTTP client, rate limiter, optional response cache.
pub struct Fetcher {
    config: FetchConfig,
    client: Option<reqwest::Client>,
    cache: Option<Cache>,
    limiter: RateLimiter,
    request_count: AtomicU64,
}

impl Fetcher {
    pub fn new(config: FetchConfig, cache: Option<Cache>) -> Result<Self, FetchError> {
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .build()?,
            )
        };
        let limiter = RateLimiter::new(config.requests_per_second, config.burst);
        Ok(Self {
            config,
            client,
            cache,
            limiter,
            request_count: AtomicU64::new(0),
        })
    }

    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// GET `path` (relative to the base URL) straight from the network. `secret`
    /// is appended to the query but kept out of cache keys and logs.
    pub async fn get_text(
        &self,
        path: &str,
        secret: Option<(&str, &str)>,
    ) -> Result<String, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::OfflineMiss(path.to_string()))?;

        self.limiter.take().await;

        let base = self.config.base_url.trim_end_matches('/');
        let mut url = if path.starts_with('?') {
            format!("{base}{path}")
        } else {
            format!("{base}/{}", path.trim_start_matches('/'))
        };
        if let Some((name, value)) = secret {
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{sep}{name}={}", urlencoding::encode(value));
        }
        debug!(provider = %self.config.provider, path, "GET");

        let res = client.get(&url).send().await?;
        let status = res.status();
        let body = res.text().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !status.is_success() {
            return Err(FetchError::Api(status.as_u16(), body));
        }
        Ok(body)
    }

    /// GET an immutable resource through the cache. `decode` runs on cached and
    /// fresh bodies alike; a fresh body is stored only once it decodes, so
    /// upstream error replies sent with a 2xx status are never replayed.
    pub async fn get_cached<T, F>(
        &self,
        path: &str,
        secret: Option<(&str, &str)>,
        decode: F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, FetchError>,
    {
        let cache_key = Cache::key_for(&self.config.provider, path);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&cache_key)? {
                match decode(&cached) {
                    Ok(value) => {
                        debug!(provider = %self.config.provider, path, "cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        debug!(
                            provider = %self.config.provider,
                            path,
                            error = %e,
                            "cached body rejected"
                        );
                    }
                }
            }
        }
        let body = self.get_text(path, secret).await?;
        let value = decode(&body)?;
        if let Some(cache) = &self.cache {
            cache.put(&cache_key, &self.config.provider, &body)?;
        }
        Ok(value)
    }

    /// Uncached GET decoded as JSON. A body that is not valid JSON for `T` is
    /// `Malformed`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        secret: Option<(&str, &str)>,
    ) -> Result<T, FetchError> {
        let body = self.get_text(path, secret).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}
