use crate::config::AppConfig;
use crate::extractor::ContentExtractor;
use crate::fetcher::{host_of, Fetcher, PageFetcher};
use crate::types::{Article, FailureReason, ScrapeBatchResult, ScrapeFailure, ScrapeLimits};
use crate::{Result, ScraperError};
use futures::{stream, StreamExt};
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// The `Scraper` fetches and extracts a batch of URLs.
///
/// Per-URL failures never abort the batch, they are recorded next to the
/// articles. Results are returned in input order regardless of completion order.
pub struct Scraper<F = Fetcher> {
    fetcher: F,
    extractor: ContentExtractor,
    /// Extractions below this confidence are recorded as `ExtractionFailed`.
    min_confidence: f64,
    progress: ProgressBar,
}

enum Outcome {
    Article(Article),
    Failed(FailureReason),
}

impl Scraper<Fetcher> {
    /// Builds a scraper backed by an HTTP [`Fetcher`] with its own rate limiter.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let fetcher = Fetcher::from_config(&config.fetch, &config.rate_limit)?;
        Ok(Self::new(
            fetcher,
            ContentExtractor::new(config.extractor.clone()),
            config.scrape.min_confidence,
        ))
    }
}

impl<F: PageFetcher> Scraper<F> {
    /// Creates a new `Scraper`.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetches the pages.
    /// * `extractor` - Isolates the article text.
    /// * `min_confidence` - Extractions below this confidence are failures.
    ///
    /// # Returns
    ///
    /// A new instance of `Scraper` with a hidden progress bar.
    pub fn new(fetcher: F, extractor: ContentExtractor, min_confidence: f64) -> Self {
        Self {
            fetcher,
            extractor,
            min_confidence,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports per-URL progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Scrapes `urls` within `limits`.
    ///
    /// Every URL ends up in exactly one of `articles` or `failures`. As soon as
    /// the first `max_articles` URLs in input order that produced an article are
    /// known, in-flight fetches for later URLs are dropped and those URLs are
    /// recorded as `LimitReached`. When the deadline passes, in-flight fetches are
    /// dropped and unresolved URLs are recorded as `DeadlineExceeded`.
    ///
    /// # Arguments
    ///
    /// * `urls` - The URLs to scrape, in priority order.
    /// * `limits` - Quota, per-attempt timeout, retries, concurrency and deadline.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `ScrapeBatchResult`. Only invalid input is an
    /// error: an empty URL list or zero limits.
    #[instrument(skip_all, fields(urls = urls.len(), max_articles = limits.max_articles))]
    pub async fn scrape(&self, urls: &[String], limits: &ScrapeLimits) -> Result<ScrapeBatchResult> {
        if urls.is_empty() {
            return Err(ScraperError::ConfigError("at least one URL is required".to_string()));
        }
        if limits.max_articles == 0 {
            return Err(ScraperError::ConfigError("max_articles must be at least 1".to_string()));
        }
        if limits.concurrency == 0 {
            return Err(ScraperError::ConfigError("concurrency must be at least 1".to_string()));
        }

        self.progress.set_length(urls.len() as u64);
        self.progress.set_message("Fetching pages...");

        let successes = AtomicUsize::new(0);
        let mut slots: Vec<Option<Outcome>> = urls.iter().map(|_| None).collect();

        {
            let successes = &successes;
            let mut pending = stream::iter(urls.iter().enumerate())
                .map(|(index, url)| async move {
                    if successes.load(Ordering::SeqCst) >= limits.max_articles {
                        return (index, Outcome::Failed(FailureReason::LimitReached));
                    }

                    self.progress.set_message(format!("Fetching {}", url));
                    let outcome = self.scrape_one(url, limits).await;
                    if matches!(outcome, Outcome::Article(_)) {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    self.progress.inc(1);
                    (index, outcome)
                })
                .buffer_unordered(limits.concurrency);

            let collect = async {
                while let Some((index, outcome)) = pending.next().await {
                    slots[index] = Some(outcome);
                    if quota_met(&slots, limits.max_articles) {
                        debug!("Article quota met, abandoning remaining fetches");
                        break;
                    }
                }
            };

            match limits.deadline {
                Some(deadline) => {
                    if timeout(deadline, collect).await.is_err() {
                        warn!(deadline_ms = deadline.as_millis() as u64, "Scrape deadline exceeded, abandoning in-flight fetches");
                    }
                }
                None => collect.await,
            }
        }

        let batch = assemble(urls, slots, limits.max_articles);

        self.progress.finish_with_message(format!(
            "Completed: {} of {} pages scraped successfully",
            batch.articles.len(),
            urls.len()
        ));
        info!(
            articles = batch.articles.len(),
            failures = batch.failures.len(),
            "Scrape batch finished"
        );

        Ok(batch)
    }

    async fn scrape_one(&self, url: &str, limits: &ScrapeLimits) -> Outcome {
        let fetched = self
            .fetcher
            .fetch(url, limits.timeout, limits.max_retries)
            .await;

        if let Some(reason) = FailureReason::from_status(fetched.status) {
            warn!(%url, %reason, attempts = fetched.attempts, "Fetch failed");
            return Outcome::Failed(reason);
        }

        let extraction = self.extractor.extract(fetched.body.as_deref().unwrap_or_default());
        if extraction.body_text.is_empty() || extraction.confidence < self.min_confidence {
            warn!(%url, confidence = extraction.confidence, "Extraction failed");
            return Outcome::Failed(FailureReason::ExtractionFailed);
        }

        let word_count = extraction.word_count();
        debug!(%url, word_count, confidence = extraction.confidence, "Extracted article");

        Outcome::Article(Article {
            url: url.to_string(),
            title: extraction.title,
            body_text: extraction.body_text,
            extraction_confidence: extraction.confidence,
            word_count,
            source_host: host_of(url).unwrap_or_default(),
            metadata: extraction.metadata,
            fetched_at: fetched.fetched_at,
        })
    }
}

/// True once the resolved prefix of `slots` already holds `max_articles` articles,
/// so nothing at a later index can make it into the batch.
fn quota_met(slots: &[Option<Outcome>], max_articles: usize) -> bool {
    let mut articles = 0;
    for slot in slots {
        match slot {
            None => return false,
            Some(Outcome::Article(_)) => {
                articles += 1;
                if articles >= max_articles {
                    return true;
                }
            }
            Some(Outcome::Failed(_)) => {}
        }
    }
    false
}

/// Re-sequences per-index outcomes into input order and applies the article quota.
fn assemble(urls: &[String], slots: Vec<Option<Outcome>>, max_articles: usize) -> ScrapeBatchResult {
    let mut batch = ScrapeBatchResult::default();

    for (url, slot) in urls.iter().zip(slots) {
        let full = batch.articles.len() >= max_articles;
        let reason = match slot {
            Some(Outcome::Article(article)) if !full => {
                batch.articles.push(article);
                continue;
            }
            Some(Outcome::Article(_)) => FailureReason::LimitReached,
            Some(Outcome::Failed(reason)) => reason,
            None if full => FailureReason::LimitReached,
            None => FailureReason::DeadlineExceeded,
        };

        batch.failures.push(ScrapeFailure {
            url: url.clone(),
            reason,
        });
    }

    batch
}
