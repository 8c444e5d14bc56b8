use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Outcome classification of a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    HttpError(u16),
    Timeout,
    NetworkError,
    /// 403/429 or a bot-challenge page.
    Blocked,
    /// The URL could not be parsed or has no host.
    InvalidUrl,
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Ok => write!(f, "ok"),
            FetchStatus::HttpError(code) => write!(f, "http error {}", code),
            FetchStatus::Timeout => write!(f, "timeout"),
            FetchStatus::NetworkError => write!(f, "network error"),
            FetchStatus::Blocked => write!(f, "blocked"),
            FetchStatus::InvalidUrl => write!(f, "invalid url"),
        }
    }
}

/// The result of fetching one URL, retries included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub status: FetchStatus,
    /// Raw HTML, present when the status is `Ok`.
    pub body: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Number of HTTP attempts issued.
    pub attempts: u32,
}

impl FetchResult {
    pub fn new(url: impl Into<String>, status: FetchStatus, body: Option<String>, attempts: u32) -> Self {
        Self {
            url: url.into(),
            status,
            body,
            fetched_at: Utc::now(),
            attempts,
        }
    }
}

/// What the content extractor found in a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub title: Option<String>,
    pub body_text: String,
    /// Always within `[0, 1]`. Zero means extraction failed.
    pub confidence: f64,
    /// Page metadata read from `<meta>` tags (description, author, date, site).
    pub metadata: BTreeMap<String, String>,
}

impl Extraction {
    pub fn word_count(&self) -> usize {
        self.body_text.split_whitespace().count()
    }
}

/// An article extracted from a successfully fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: Option<String>,
    pub body_text: String,
    pub extraction_confidence: f64,
    pub word_count: usize,
    pub source_host: String,
    pub metadata: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

/// Why a URL did not produce an article.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    #[error("network-error")]
    NetworkError,
    #[error("timeout")]
    Timeout,
    #[error("http-error-{0}")]
    HttpError(u16),
    #[error("blocked")]
    Blocked,
    #[error("invalid-url")]
    InvalidUrl,
    #[error("extraction-failed")]
    ExtractionFailed,
    #[error("deadline-exceeded")]
    DeadlineExceeded,
    /// Not attempted, or discarded, because `max_articles` was already met.
    #[error("limit-reached")]
    LimitReached,
}

impl FailureReason {
    /// Maps a non-`Ok` fetch status to the failure it represents.
    pub fn from_status(status: FetchStatus) -> Option<Self> {
        match status {
            FetchStatus::Ok => None,
            FetchStatus::HttpError(code) => Some(FailureReason::HttpError(code)),
            FetchStatus::Timeout => Some(FailureReason::Timeout),
            FetchStatus::NetworkError => Some(FailureReason::NetworkError),
            FetchStatus::Blocked => Some(FailureReason::Blocked),
            FetchStatus::InvalidUrl => Some(FailureReason::InvalidUrl),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// Result of one scrape batch. Both lists follow input URL order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeBatchResult {
    pub articles: Vec<Article>,
    pub failures: Vec<ScrapeFailure>,
}

/// What happened to a single URL of a batch.
#[derive(Debug, Clone, Copy)]
pub enum UrlOutcome<'a> {
    Article(&'a Article),
    Failed(FailureReason),
}

impl ScrapeBatchResult {
    pub fn len(&self) -> usize {
        self.articles.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up the outcome recorded for `url`.
    pub fn outcome_of(&self, url: &str) -> Option<UrlOutcome<'_>> {
        if let Some(article) = self.articles.iter().find(|a| a.url == url) {
            return Some(UrlOutcome::Article(article));
        }
        self.failures
            .iter()
            .find(|f| f.url == url)
            .map(|f| UrlOutcome::Failed(f.reason))
    }
}

/// Per-batch limits for [`crate::Scraper::scrape`].
#[derive(Debug, Clone)]
pub struct ScrapeLimits {
    pub max_articles: usize,
    /// Timeout of a single HTTP attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub concurrency: usize,
    /// Overall deadline for the whole batch.
    pub deadline: Option<Duration>,
}

impl Default for ScrapeLimits {
    fn default() -> Self {
        Self {
            max_articles: 15,
            timeout: crate::DEFAULT_TIMEOUT,
            max_retries: crate::DEFAULT_MAX_RETRIES,
            concurrency: crate::DEFAULT_CONCURRENT_REQUESTS,
            deadline: Some(Duration::from_secs(120)),
        }
    }
}

/// A hit returned by a search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::ExtractionFailed.to_string(), "extraction-failed");
        assert_eq!(FailureReason::DeadlineExceeded.to_string(), "deadline-exceeded");
        assert_eq!(FailureReason::HttpError(503).to_string(), "http-error-503");
    }

    #[test]
    fn test_failure_from_status() {
        assert_eq!(FailureReason::from_status(FetchStatus::Ok), None);
        assert_eq!(
            FailureReason::from_status(FetchStatus::HttpError(404)),
            Some(FailureReason::HttpError(404))
        );
        assert_eq!(
            FailureReason::from_status(FetchStatus::Blocked),
            Some(FailureReason::Blocked)
        );
    }

    #[test]
    fn test_outcome_lookup() {
        let batch = ScrapeBatchResult {
            articles: vec![],
            failures: vec![ScrapeFailure {
                url: "https://example.com/a".to_string(),
                reason: FailureReason::Timeout,
            }],
        };

        assert!(matches!(
            batch.outcome_of("https://example.com/a"),
            Some(UrlOutcome::Failed(FailureReason::Timeout))
        ));
        assert!(batch.outcome_of("https://example.com/b").is_none());
        assert_eq!(batch.len(), 1);
    }
}
