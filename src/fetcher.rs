use crate::config::{FetchConfig, RateLimit};
use crate::rate_limit::RateLimiter;
use crate::types::{FetchResult, FetchStatus};
use crate::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

/// Anything that can turn a URL into a [`FetchResult`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration, max_retries: u32) -> FetchResult;
}

/// The `Fetcher` performs rate-limited HTTP GETs with retries and block detection.
pub struct Fetcher {
    /// The HTTP client used for making requests.
    client: Client,
    rate_limiter: Arc<RateLimiter>,
    backoff_base: Duration,
    backoff_cap: Duration,
    challenge_markers: Vec<String>,
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    /// Final, whatever the retry budget.
    Done(FetchStatus, Option<String>),
    /// Timeout or connection error, retried with backoff.
    Transient(FetchStatus),
    /// 5xx, retried once.
    ServerError(u16),
}

impl Fetcher {
    /// Creates a new `Fetcher` sharing the given rate limiter.
    ///
    /// # Arguments
    ///
    /// * `config` - User agent, backoff and challenge marker settings.
    /// * `rate_limiter` - The per-host limiter consulted before every attempt.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `Fetcher`, or an error if the HTTP client cannot be built.
    pub fn new(config: &FetchConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(ScraperError::RequestError)?;

        Ok(Self {
            client,
            rate_limiter,
            backoff_base: config.backoff_base(),
            backoff_cap: config.backoff_cap(),
            challenge_markers: config.challenge_markers.clone(),
        })
    }

    /// Creates a `Fetcher` with its own rate limiter.
    pub fn from_config(fetch: &FetchConfig, rate_limit: &RateLimit) -> Result<Self> {
        Self::new(fetch, Arc::new(RateLimiter::new(rate_limit.min_interval())))
    }

    /// Fetches `url`, waiting for the host's rate limit before every attempt.
    ///
    /// 403/429 and challenge pages are `Blocked` without retry, other 4xx are
    /// final, 5xx get one retry, timeouts and connection errors get up to
    /// `max_retries` retries with exponential backoff.
    ///
    /// # Arguments
    ///
    /// * `url` - The page to fetch.
    /// * `timeout` - Timeout of a single attempt.
    /// * `max_retries` - Retries allowed for timeouts and connection errors.
    ///
    /// # Returns
    ///
    /// A `FetchResult` with the body when the status is `Ok`. Failures are
    /// reported in the status, never as an error.
    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn fetch(&self, url: &str, timeout: Duration, max_retries: u32) -> FetchResult {
        let Some(host) = host_of(url) else {
            warn!("URL has no host");
            return FetchResult::new(url, FetchStatus::InvalidUrl, None, 0);
        };

        let mut attempts = 0;
        let mut retries = 0;
        let mut server_retry_used = false;

        loop {
            self.rate_limiter.await_turn(&host).await;
            attempts += 1;

            let status = match self.try_fetch(url, timeout).await {
                Attempt::Done(status, body) => {
                    debug!(%status, attempts, "Fetch finished");
                    return FetchResult::new(url, status, body, attempts);
                }
                Attempt::ServerError(code) if !server_retry_used && retries < max_retries => {
                    server_retry_used = true;
                    FetchStatus::HttpError(code)
                }
                Attempt::ServerError(code) => {
                    return FetchResult::new(url, FetchStatus::HttpError(code), None, attempts);
                }
                Attempt::Transient(status) if retries < max_retries => status,
                Attempt::Transient(status) => {
                    warn!(%status, attempts, "Retries exhausted");
                    return FetchResult::new(url, status, None, attempts);
                }
            };

            let delay = self.backoff(retries);
            debug!(%status, attempt = attempts, delay_ms = delay.as_millis() as u64, "Retrying");
            sleep(delay).await;
            retries += 1;
        }
    }

    /// `base * 2^retry`, capped.
    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.backoff_cap)
    }

    /// Attempts to fetch a single URL once.
    async fn try_fetch(&self, url: &str, timeout: Duration) -> Attempt {
        let response = self.client
            .get(url)
            .timeout(timeout)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("Connection", "keep-alive")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Attempt::Transient(classify(&e)),
        };

        let status = response.status();
        debug!(%status, "Response received");

        if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            return Attempt::Done(FetchStatus::Blocked, None);
        }
        if status.is_client_error() || status.is_redirection() || status.is_informational() {
            return Attempt::Done(FetchStatus::HttpError(status.as_u16()), None);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Transient(classify(&e)),
        };

        // challenge pages are served with 200 or 503
        if self.is_challenge(&body) {
            return Attempt::Done(FetchStatus::Blocked, None);
        }
        if status.is_server_error() {
            return Attempt::ServerError(status.as_u16());
        }

        Attempt::Done(FetchStatus::Ok, Some(body))
    }

    fn is_challenge(&self, body: &str) -> bool {
        self.challenge_markers
            .iter()
            .any(|marker| !marker.is_empty() && body.contains(marker.as_str()))
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch(&self, url: &str, timeout: Duration, max_retries: u32) -> FetchResult {
        Fetcher::fetch(self, url, timeout, max_retries).await
    }
}

fn classify(error: &reqwest::Error) -> FetchStatus {
    if error.is_timeout() {
        FetchStatus::Timeout
    } else {
        FetchStatus::NetworkError
    }
}

/// The lowercased host of `url`, the rate-limiting key.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_ascii_lowercase())
}
