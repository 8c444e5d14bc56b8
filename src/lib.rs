use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod rate_limit;
pub mod report;
pub mod scraper;
pub mod search;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use extractor::{ContentExtractor, ExtractorConfig};
pub use fetcher::{Fetcher, PageFetcher};
pub use rate_limit::RateLimiter;
pub use scraper::Scraper;
pub use types::{
    Article, Extraction, FailureReason, FetchResult, FetchStatus, ScrapeBatchResult,
    ScrapeFailure, ScrapeLimits, SearchResult,
};

/// The `ScraperError` enum represents the errors that can surface to a caller of this crate.
///
/// Per-URL problems during a scrape are not errors: they are recorded as
/// [`FailureReason`]s in the batch result.
#[derive(Error, Debug)]
pub enum ScraperError {
    /// Represents an error that occurs during an HTTP request.
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Represents an error that occurs during LLM processing.
    #[error("LLM processing failed: {0}")]
    LLMError(String),
    /// Represents an error that occurs during a search operation.
    #[error("Search failed: {0}")]
    SearchError(String),
    /// Invalid caller input or configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
    /// Represents an error that occurs while writing a report.
    #[error("Report export failed: {0}")]
    ExportError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<::config::ConfigError> for ScraperError {
    fn from(err: ::config::ConfigError) -> Self {
        ScraperError::ConfigError(err.to_string())
    }
}

/// A type alias for `Result` with the `ScraperError` error type.
pub type Result<T> = std::result::Result<T, ScraperError>;

// Constants

/// The default timeout duration for a single HTTP attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// The default number of concurrent page fetches.
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 4;
/// The default maximum number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// The default spacing between two requests to the same host.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);
/// The default browser user agent. Many news sites reject library signatures.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
