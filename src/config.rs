use crate::extractor::ExtractorConfig;
use crate::types::ScrapeLimits;
use crate::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Upper bound on search results requested for one topic.
pub const MAX_SEARCH_RESULTS: usize = 50;
/// Upper bound on articles scraped for one topic.
pub const MAX_SCRAPE_ARTICLES: usize = 30;

/// The `AppConfig` struct holds every setting of the application.
///
/// Values are layered: built-in defaults, then an optional config file, then
/// `NEWSBRIEF_<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub rate_limit: RateLimit,
    pub scrape: ScrapeConfig,
    pub extractor: ExtractorConfig,
    pub search: SearchConfig,
    pub llm: LLMConfig,
    pub output: OutputConfig,
}

/// HTTP fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout of a single attempt, in seconds.
    pub timeout_secs: u64,
    /// Retries for timeouts and connection errors.
    pub max_retries: u32,
    /// The user agent string to be used in HTTP requests.
    pub user_agent: String,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Body substrings identifying a bot-challenge page.
    pub challenge_markers: Vec<String>,
}

/// The `RateLimit` struct holds the per-host request spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// Minimum time between two requests to the same host, in milliseconds.
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub max_articles: usize,
    /// The number of pages fetched concurrently.
    pub concurrency: usize,
    /// Overall batch deadline in seconds, `0` disables it.
    pub deadline_secs: u64,
    /// Extractions below this confidence are recorded as failures.
    pub min_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub region: String,
    /// DuckDuckGo `df` filter (`d`, `w`, `m`, `y`), empty for no limit.
    pub time_limit: String,
    pub max_results: usize,
}

/// The `LLMConfig` struct holds the configuration settings for the Language Model (LLM).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// An OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// The temperature setting for the LLM, controlling the randomness of the output.
    pub temperature: f32,
    /// The maximum number of tokens allowed in a summary.
    pub max_tokens: u32,
    /// The maximum number of tokens allowed in the topic analysis.
    pub analysis_max_tokens: u32,
    /// The maximum number of tokens allowed in the executive report.
    pub report_max_tokens: u32,
    pub timeout_secs: u64,
    /// Summaries are skipped when no key is configured.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub format: OutputFormat,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: crate::DEFAULT_TIMEOUT.as_secs(),
            max_retries: crate::DEFAULT_MAX_RETRIES,
            user_agent: crate::DEFAULT_USER_AGENT.to_string(),
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            challenge_markers: [
                "cf-browser-verification",
                "challenge-platform",
                "cf-chl-bypass",
                "Attention Required! | Cloudflare",
                "px-captcha",
                "Please verify you are a human",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            min_interval_ms: crate::DEFAULT_MIN_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_articles: 15,
            concurrency: crate::DEFAULT_CONCURRENT_REQUESTS,
            deadline_secs: 120,
            min_confidence: 0.2,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://html.duckduckgo.com/html/"),
            region: String::from("us-en"),
            time_limit: String::from("d"),
            max_results: 20,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://api.openai.com/v1/chat/completions"),
            model: String::from("gpt-4o-mini"),
            temperature: 0.2,
            max_tokens: 200,
            analysis_max_tokens: 800,
            report_max_tokens: 1200,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            format: OutputFormat::Json,
        }
    }
}

impl AppConfig {
    /// Loads the configuration, layering an optional file and the environment over the defaults.
    ///
    /// # Arguments
    ///
    /// * `path` - An optional config file. TOML, YAML or JSON, picked by extension.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppConfig`, or an error if the file is missing or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading config file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("NEWSBRIEF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Batch limits for the scraper derived from this configuration.
    pub fn scrape_limits(&self) -> ScrapeLimits {
        ScrapeLimits {
            max_articles: self.scrape.max_articles.clamp(1, MAX_SCRAPE_ARTICLES),
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_retries: self.fetch.max_retries,
            concurrency: self.scrape.concurrency.max(1),
            deadline: (self.scrape.deadline_secs > 0)
                .then(|| Duration::from_secs(self.scrape.deadline_secs)),
        }
    }

    /// Number of search results to request, clamped to `1..=MAX_SEARCH_RESULTS`.
    pub fn search_count(&self) -> usize {
        self.search.max_results.clamp(1, MAX_SEARCH_RESULTS)
    }
}

impl FetchConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

impl RateLimit {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limit.min_interval(), Duration::from_secs(1));
        assert_eq!(config.scrape.concurrency, 4);
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_scrape_limits_are_clamped() {
        let mut config = AppConfig::default();
        config.scrape.max_articles = 500;
        config.scrape.concurrency = 0;
        config.scrape.deadline_secs = 0;

        let limits = config.scrape_limits();
        assert_eq!(limits.max_articles, MAX_SCRAPE_ARTICLES);
        assert_eq!(limits.concurrency, 1);
        assert!(limits.deadline.is_none());

        config.search.max_results = 0;
        assert_eq!(config.search_count(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("newsbrief-config-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "scrape": {{ "concurrency": 2 }}, "output": {{ "format": "markdown" }} }}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.scrape.concurrency, 2);
        assert_eq!(config.output.format, OutputFormat::Markdown);
        // untouched keys keep their defaults
        assert_eq!(config.scrape.max_articles, 15);
        assert_eq!(config.fetch.max_retries, crate::DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/newsbrief.toml")));
        assert!(result.is_err());
    }
}
