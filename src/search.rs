use crate::config::{FetchConfig, SearchConfig};
use crate::types::SearchResult;
use crate::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Returns candidate article URLs for a topic.
///
/// Zero results is a valid outcome, not an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, topic: &str, count: usize) -> Result<Vec<SearchResult>>;
}

/// Search through the DuckDuckGo HTML endpoint.
pub struct DuckDuckGoSearch {
    /// The HTTP client used for making requests.
    client: Client,
    endpoint: String,
    region: String,
    time_limit: String,
}

impl DuckDuckGoSearch {
    /// Creates a new `DuckDuckGoSearch`.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, region and time filter.
    /// * `fetch` - User agent and timeout for the search request.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `DuckDuckGoSearch`, or an error if the HTTP client cannot be built.
    pub fn new(config: &SearchConfig, fetch: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&fetch.user_agent)
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .gzip(true)
            .build()
            .map_err(ScraperError::RequestError)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            region: config.region.clone(),
            time_limit: config.time_limit.clone(),
        })
    }

    /// Parses a result page, keeping rank order and dropping ads and duplicates.
    fn parse_results(&self, html: &str, count: usize) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let (Ok(result_selector), Ok(link_selector), Ok(snippet_selector)) = (
            Selector::parse("div.result"),
            Selector::parse("a.result__a"),
            Selector::parse(".result__snippet"),
        ) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for result in document.select(&result_selector) {
            if result.value().classes().any(|c| c == "result--ad") {
                debug!("Skipping sponsored result");
                continue;
            }

            let Some(link) = result.select(&link_selector).next() else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };

            let Some(url) = clean_redirect_url(href) else {
                debug!("Could not clean URL: {}", href);
                continue;
            };
            if !is_valid_url(&url) || !seen.insert(url.clone()) {
                debug!("Skipping URL: {}", url);
                continue;
            }

            results.push(SearchResult {
                title: text_of(link),
                snippet: result
                    .select(&snippet_selector)
                    .next()
                    .map(text_of)
                    .unwrap_or_default(),
                url,
            });

            if results.len() >= count {
                break;
            }
        }

        results
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    #[instrument(skip(self))]
    async fn search(&self, topic: &str, count: usize) -> Result<Vec<SearchResult>> {
        let mut url = format!(
            "{}?q={}&kl={}",
            self.endpoint,
            urlencoding::encode(topic),
            urlencoding::encode(&self.region)
        );
        if !self.time_limit.is_empty() {
            url.push_str(&format!("&df={}", urlencoding::encode(&self.time_limit)));
        }

        debug!("Search URL: {}", url);

        let response = self.client
            .get(&url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;

        let status = response.status();
        debug!("Response status: {}", status);
        if !status.is_success() {
            return Err(ScraperError::SearchError(format!(
                "search endpoint returned {}",
                status
            )));
        }

        let html = response.text().await?;
        let results = self.parse_results(&html, count);

        if results.is_empty() {
            warn!("No valid URLs found in the response");
        } else {
            info!(count = results.len(), "Search returned results");
        }

        Ok(results)
    }
}

/// Resolves DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`) to the target URL.
fn clean_redirect_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;

    if parsed.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) && parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned());
    }

    matches!(parsed.scheme(), "http" | "https").then(|| parsed.to_string())
}

fn is_valid_url(url: &str) -> bool {
    // Invalid patterns
    let invalid_patterns = [
        "duckduckgo.com/",
        "duckduckgo.com?",
        "bing.com/aclick",
        "/y.js",
        "javascript:",
    ];

    url.starts_with("http")
        && Url::parse(url).is_ok_and(|u| u.host_str().is_some())
        && !invalid_patterns.iter().any(|&pattern| url.contains(pattern))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
