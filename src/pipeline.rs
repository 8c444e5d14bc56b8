use crate::config::{AppConfig, SearchConfig, MAX_SCRAPE_ARTICLES, MAX_SEARCH_RESULTS};
use crate::fetcher::{Fetcher, PageFetcher};
use crate::llm::{LLMProcessor, Summarizer};
use crate::prompt::{PromptBuilder, ANALYSIS_ARTICLES};
use crate::report::{basic_summary_report, exporter_for, Report, ReportExporter};
use crate::scraper::Scraper;
use crate::search::{DuckDuckGoSearch, SearchProvider};
use crate::types::{ScrapeBatchResult, ScrapeLimits};
use crate::{Result, ScraperError};
use indicatif::ProgressBar;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Articles shorter than this are not sent to the summarizer.
const MIN_SUMMARY_CHARS: usize = 100;
const INSUFFICIENT_CONTENT: &str = "Insufficient content to summarize";

/// Per-run knobs, usually coming from the command line.
///
/// Counts left at `None` fall back to the pipeline's configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub search_count: Option<usize>,
    pub scrape_count: Option<usize>,
    /// Entries kept in the report, defaults to the scrape count.
    pub report_detail: Option<usize>,
}

/// [`RunOptions`] with every count resolved and clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub search_count: usize,
    pub scrape_count: usize,
    pub report_detail: usize,
}

impl RunOptions {
    /// Fills unset counts from the given defaults and clamps them to the supported ranges.
    ///
    /// # Arguments
    ///
    /// * `search_count` - Search results requested when `self.search_count` is unset.
    /// * `scrape_count` - Articles kept when `self.scrape_count` is unset.
    ///
    /// # Returns
    ///
    /// The resolved counts.
    pub fn resolve(&self, search_count: usize, scrape_count: usize) -> ResolvedOptions {
        let scrape_count = self.scrape_count.unwrap_or(scrape_count).clamp(1, MAX_SCRAPE_ARTICLES);
        ResolvedOptions {
            search_count: self.search_count.unwrap_or(search_count).clamp(1, MAX_SEARCH_RESULTS),
            scrape_count,
            report_detail: self.report_detail.unwrap_or(scrape_count).max(1),
        }
    }
}

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,
    /// `None` when the search found nothing and no report was written.
    pub path: Option<PathBuf>,
}

/// Runs topic → search → scrape → summarize → report → export.
pub struct Pipeline<F = Fetcher> {
    search: Box<dyn SearchProvider>,
    scraper: Scraper<F>,
    summarizer: Option<Box<dyn Summarizer>>,
    exporter: Box<dyn ReportExporter>,
    limits: ScrapeLimits,
    /// Search results requested when a run does not say otherwise.
    search_count: usize,
    progress: ProgressBar,
}

impl Pipeline<Fetcher> {
    /// Wires the default collaborators. No summarizer is built without an API key.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let summarizer: Option<Box<dyn Summarizer>> = match config.llm.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Some(Box::new(LLMProcessor::new(config.llm.clone())?)),
            _ => {
                info!("No LLM API key configured, summaries are disabled");
                None
            }
        };

        Ok(Self::new(
            Box::new(DuckDuckGoSearch::new(&config.search, &config.fetch)?),
            Scraper::from_config(config)?,
            summarizer,
            exporter_for(config.output.format, config.output.directory.clone()),
            config.scrape_limits(),
        )
        .with_search_count(config.search_count()))
    }
}

impl<F: PageFetcher> Pipeline<F> {
    pub fn new(
        search: Box<dyn SearchProvider>,
        scraper: Scraper<F>,
        summarizer: Option<Box<dyn Summarizer>>,
        exporter: Box<dyn ReportExporter>,
        limits: ScrapeLimits,
    ) -> Self {
        Self {
            search,
            scraper,
            summarizer,
            exporter,
            limits,
            search_count: SearchConfig::default().max_results,
            progress: ProgressBar::hidden(),
        }
    }

    /// Sets the number of search results requested when a run does not override it.
    pub fn with_search_count(mut self, search_count: usize) -> Self {
        self.search_count = search_count;
        self
    }

    /// Shows stage messages on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Shows per-URL scrape progress on `progress`.
    pub fn with_scrape_progress(mut self, progress: ProgressBar) -> Self {
        self.scraper = self.scraper.with_progress(progress);
        self
    }

    pub fn without_summarizer(mut self) -> Self {
        self.summarizer = None;
        self
    }

    #[instrument(skip(self, topic, options), fields(topic = %topic))]
    pub async fn run(&self, topic: &str, options: &RunOptions) -> Result<RunSummary> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ScraperError::ConfigError("topic must not be empty".to_string()));
        }
        let options = options.resolve(self.search_count, self.limits.max_articles);
        let detail = options.report_detail;

        self.progress.set_message(format!("Searching for '{}'...", topic));
        let searched = self.search.search(topic, options.search_count).await?;
        info!(found = searched.len(), "Search finished");

        if searched.is_empty() {
            warn!("No articles found for the topic");
            self.progress.finish_with_message("No articles found");
            let report = Report::new(topic, &searched, ScrapeBatchResult::default(), Vec::new(), None, detail);
            return Ok(RunSummary { report, path: None });
        }

        let urls: Vec<String> = searched.iter().map(|s| s.url.clone()).collect();
        let limits = ScrapeLimits {
            max_articles: options.scrape_count,
            ..self.limits.clone()
        };
        self.progress.set_message(format!("Scraping up to {} articles...", limits.max_articles));
        let batch = self.scraper.scrape(&urls, &limits).await?;

        let (summaries, analysis) = match &self.summarizer {
            Some(summarizer) => {
                self.progress.set_message("Summarizing articles...");
                let summaries = self.summarize_all(summarizer.as_ref(), &batch, detail).await;
                let analysis = self.analyze(summarizer.as_ref(), topic, &batch).await;
                (summaries, analysis)
            }
            None => (Vec::new(), None),
        };

        self.progress.set_message("Writing executive report...");
        let summary_report = self.summary_report(topic, &batch, &summaries).await;

        let report = Report::new(topic, &searched, batch, summaries, analysis, detail)
            .with_summary_report(summary_report);

        self.progress.set_message("Writing report...");
        let path = self.exporter.export(&report).await?;
        self.progress.finish_with_message(format!("Report written to {}", path.display()));

        Ok(RunSummary {
            report,
            path: Some(path),
        })
    }

    /// Summaries for the first `detail` articles. Failures leave a `None`.
    async fn summarize_all(
        &self,
        summarizer: &dyn Summarizer,
        batch: &ScrapeBatchResult,
        detail: usize,
    ) -> Vec<Option<String>> {
        let mut summaries = Vec::with_capacity(batch.articles.len().min(detail));

        for article in batch.articles.iter().take(detail) {
            if article.body_text.chars().count() < MIN_SUMMARY_CHARS {
                summaries.push(Some(INSUFFICIENT_CONTENT.to_string()));
                continue;
            }

            match summarizer.summarize(&PromptBuilder::article_text(article)).await {
                Ok(summary) => summaries.push(Some(summary)),
                Err(e) => {
                    warn!(url = %article.url, error = %e, "Summary generation failed");
                    summaries.push(None);
                }
            }
        }

        summaries
    }

    /// The executive briefing, written by the summarizer when there is one and
    /// from the article digest otherwise. `None` without articles.
    async fn summary_report(
        &self,
        topic: &str,
        batch: &ScrapeBatchResult,
        summaries: &[Option<String>],
    ) -> Option<String> {
        if batch.articles.is_empty() {
            return None;
        }

        let digest = PromptBuilder::digest(&batch.articles, summaries);
        let note = match &self.summarizer {
            Some(summarizer) => match summarizer.report(topic, batch.articles.len(), &digest).await {
                Ok(report) => return Some(report),
                Err(e) => {
                    warn!(error = %e, "Executive report generation failed");
                    "report generation failed"
                }
            },
            None => "no API key configured",
        };

        Some(basic_summary_report(topic, &batch.articles, &digest, note))
    }

    async fn analyze(&self, summarizer: &dyn Summarizer, topic: &str, batch: &ScrapeBatchResult) -> Option<String> {
        if batch.articles.is_empty() {
            return None;
        }

        let articles = &batch.articles[..batch.articles.len().min(ANALYSIS_ARTICLES)];
        match summarizer.analyze(topic, articles).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!(error = %e, "Analysis failed");
                None
            }
        }
    }
}
