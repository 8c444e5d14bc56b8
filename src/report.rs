//! Report model and exporters.
//!
//! A [`Report`] gathers everything produced for one topic: the articles with
//! their summaries, the failures, the optional analysis and a few aggregate
//! statistics. Exporters turn it into a file:
//!
//! ```text
//! output_dir/
//! ├── news_report_electric_cars_20250506_143012.json
//! └── news_report_electric_cars_20250506_143455.md
//! ```

use crate::config::OutputFormat;
use crate::prompt::truncate_chars;
use crate::types::{Article, FailureReason, ScrapeBatchResult, ScrapeFailure, SearchResult};
use crate::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Characters of article text shown when an entry has no summary.
const EXCERPT_CHARS: usize = 500;
/// Characters of the article digest quoted by the basic executive report.
const DIGEST_CHARS: usize = 1000;

/// One article of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub article: Article,
    /// Title reported by the search engine.
    pub search_title: Option<String>,
    /// Snippet reported by the search engine.
    pub snippet: Option<String>,
    pub summary: Option<String>,
}

/// Aggregate numbers over a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub articles_found: usize,
    /// URLs actually attempted, limit skips excluded.
    pub articles_scraped: usize,
    pub successful_scrapes: usize,
    /// `successful_scrapes / articles_scraped`, in `[0, 1]`.
    pub success_rate: f64,
    pub total_words: usize,
    pub average_words: f64,
    pub average_confidence: f64,
    pub summaries_generated: usize,
    /// Word count of the shortest article.
    pub shortest_words: usize,
    /// Word count of the longest article.
    pub longest_words: usize,
    /// Upper median of the article word counts.
    pub median_words: usize,
    /// Population standard deviation of the article word counts.
    pub words_std_dev: f64,
    /// Articles per source host, most frequent first.
    pub sources: Vec<(String, usize)>,
}

/// Everything produced for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub topic: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
    pub failures: Vec<ScrapeFailure>,
    pub analysis: Option<String>,
    /// Executive briefing written from the article summaries.
    #[serde(default)]
    pub summary_report: Option<String>,
    pub stats: ReportStats,
}

impl Report {
    /// Builds a report from the search hits and the scrape batch.
    ///
    /// `summaries` is indexed like `batch.articles`. At most `detail` entries are
    /// kept; statistics always cover the whole batch.
    pub fn new(
        topic: impl Into<String>,
        searched: &[SearchResult],
        batch: ScrapeBatchResult,
        mut summaries: Vec<Option<String>>,
        analysis: Option<String>,
        detail: usize,
    ) -> Self {
        summaries.resize(batch.articles.len(), None);

        let failures: Vec<ScrapeFailure> = batch
            .failures
            .into_iter()
            .filter(|f| f.reason != FailureReason::LimitReached)
            .collect();

        let stats = ReportStats::compute(searched.len(), &batch.articles, failures.len(), &summaries);

        let entries = batch
            .articles
            .into_iter()
            .zip(summaries)
            .take(detail)
            .map(|(article, summary)| {
                let hit = searched.iter().find(|s| s.url == article.url);
                ReportEntry {
                    search_title: hit.map(|s| s.title.clone()).filter(|t| !t.is_empty()),
                    snippet: hit.map(|s| s.snippet.clone()).filter(|s| !s.is_empty()),
                    article,
                    summary,
                }
            })
            .collect();

        Self {
            topic: topic.into(),
            generated_at: Utc::now(),
            entries,
            failures,
            analysis,
            summary_report: None,
            stats,
        }
    }

    /// Attaches the executive briefing.
    pub fn with_summary_report(mut self, summary_report: Option<String>) -> Self {
        self.summary_report = summary_report;
        self
    }

    /// Renders the report as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let stats = &self.stats;

        let _ = writeln!(md, "# News Report: {}\n", self.topic);
        let _ = writeln!(md, "_Generated {}_\n", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));

        let _ = writeln!(md, "## Overview\n");
        let _ = writeln!(md, "| Metric | Value |\n|---|---|");
        let _ = writeln!(md, "| Articles Found | {} |", stats.articles_found);
        let _ = writeln!(md, "| Articles Scraped | {} |", stats.articles_scraped);
        let _ = writeln!(md, "| Successful Extractions | {} |", stats.successful_scrapes);
        let _ = writeln!(md, "| Success Rate | {:.0}% |", stats.success_rate * 100.0);
        let _ = writeln!(md, "| Total Words | {} |", stats.total_words);
        let _ = writeln!(md, "| Average Confidence | {:.2} |\n", stats.average_confidence);

        if stats.successful_scrapes > 0 {
            let _ = writeln!(md, "### Content Distribution\n");
            let _ = writeln!(md, "- Shortest Article: {} words", stats.shortest_words);
            let _ = writeln!(md, "- Longest Article: {} words", stats.longest_words);
            let _ = writeln!(md, "- Median Length: {} words", stats.median_words);
            let _ = writeln!(md, "- Standard Deviation: {:.1} words\n", stats.words_std_dev);
        }

        if let Some(summary_report) = &self.summary_report {
            let _ = writeln!(md, "## Executive Report\n\n{}\n", summary_report.trim());
        }

        if let Some(analysis) = &self.analysis {
            let _ = writeln!(md, "## Analysis\n\n{}\n", analysis.trim());
        }

        if !self.entries.is_empty() {
            let _ = writeln!(md, "## Articles\n");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            let article = &entry.article;
            let title = article
                .title
                .as_deref()
                .or(entry.search_title.as_deref())
                .unwrap_or("[No Title]");

            let _ = writeln!(md, "### {}. {}\n", i + 1, title);
            let _ = writeln!(
                md,
                "[{}]({}) · {} words · confidence {:.2}\n",
                article.source_host, article.url, article.word_count, article.extraction_confidence
            );
            match &entry.summary {
                Some(summary) => {
                    let _ = writeln!(md, "{}\n", summary.trim());
                }
                None => {
                    let excerpt = truncate_chars(&article.body_text, EXCERPT_CHARS);
                    let _ = writeln!(md, "> {}…\n", excerpt.replace("\n\n", "\n>\n> "));
                }
            }
        }

        if !stats.sources.is_empty() {
            let _ = writeln!(md, "## Sources\n");
            let _ = writeln!(md, "| Source Domain | Articles | Percentage |\n|---|---|---|");
            for (host, count) in &stats.sources {
                let share = *count as f64 / stats.successful_scrapes.max(1) as f64 * 100.0;
                let _ = writeln!(md, "| {} | {} | {:.1}% |", host, count, share);
            }
            md.push('\n');
        }

        if !self.failures.is_empty() {
            let _ = writeln!(md, "## Failed Sources\n");
            for failure in &self.failures {
                let _ = writeln!(md, "- {} ({})", failure.url, failure.reason);
            }
        }

        md
    }
}

impl ReportStats {
    fn compute(found: usize, articles: &[Article], failed: usize, summaries: &[Option<String>]) -> Self {
        let successful = articles.len();
        let attempted = successful + failed;
        let total_words: usize = articles.iter().map(|a| a.word_count).sum();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for article in articles {
            *counts.entry(article.source_host.as_str()).or_default() += 1;
        }
        let mut sources: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(host, count)| (host.to_string(), count))
            .collect();
        sources.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let ratio = |num: f64, den: usize| if den == 0 { 0.0 } else { num / den as f64 };

        let mut word_counts: Vec<usize> = articles.iter().map(|a| a.word_count).collect();
        word_counts.sort_unstable();
        let mean = ratio(total_words as f64, successful);
        let variance = ratio(
            word_counts.iter().map(|&w| (w as f64 - mean).powi(2)).sum(),
            successful,
        );

        Self {
            articles_found: found,
            articles_scraped: attempted,
            successful_scrapes: successful,
            success_rate: ratio(successful as f64, attempted),
            total_words,
            average_words: ratio(total_words as f64, successful),
            average_confidence: ratio(
                articles.iter().map(|a| a.extraction_confidence).sum(),
                successful,
            ),
            summaries_generated: summaries.iter().filter(|s| s.is_some()).count(),
            shortest_words: word_counts.first().copied().unwrap_or(0),
            longest_words: word_counts.last().copied().unwrap_or(0),
            median_words: word_counts.get(word_counts.len() / 2).copied().unwrap_or(0),
            words_std_dev: variance.sqrt(),
            sources,
        }
    }
}

/// Executive briefing written without a language model.
///
/// # Arguments
///
/// * `topic` - The topic of the run.
/// * `articles` - The scraped articles.
/// * `digest` - Per-article digest, see [`crate::prompt::PromptBuilder::digest`].
/// * `note` - Why no model-written briefing is available.
///
/// # Returns
///
/// A Markdown briefing with the executive summary, themes and key developments sections.
pub fn basic_summary_report(topic: &str, articles: &[Article], digest: &str, note: &str) -> String {
    let total_words: usize = articles.iter().map(|a| a.word_count).sum();
    format!(
        "**Executive Summary**\n\
         Analysis of {count} articles about {topic}.\n\n\
         **Major Themes**\n\
         Based on {count} scraped articles with a total of {total_words} words analyzed.\n\n\
         **Key Developments**\n\
         {developments}\n\n\
         **Note**: Full AI analysis unavailable ({note})",
        count = articles.len(),
        developments = truncate_chars(digest.trim(), DIGEST_CHARS),
    )
}

/// Writes a [`Report`] somewhere and returns the path of the written file.
#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export(&self, report: &Report) -> Result<PathBuf>;
}

/// Writes pretty-printed JSON.
pub struct JsonExporter {
    directory: PathBuf,
}

/// Writes a Markdown document.
pub struct MarkdownExporter {
    directory: PathBuf,
}

impl JsonExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl MarkdownExporter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

/// Picks the exporter for `format`.
pub fn exporter_for(format: OutputFormat, directory: impl Into<PathBuf>) -> Box<dyn ReportExporter> {
    match format {
        OutputFormat::Json => Box::new(JsonExporter::new(directory)),
        OutputFormat::Markdown => Box::new(MarkdownExporter::new(directory)),
    }
}

#[async_trait]
impl ReportExporter for JsonExporter {
    #[instrument(level = "info", skip_all, fields(directory = %self.directory.display()))]
    async fn export(&self, report: &Report) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(report)?;
        write_report(&self.directory, report, "json", json).await
    }
}

#[async_trait]
impl ReportExporter for MarkdownExporter {
    #[instrument(level = "info", skip_all, fields(directory = %self.directory.display()))]
    async fn export(&self, report: &Report) -> Result<PathBuf> {
        write_report(&self.directory, report, "md", report.to_markdown()).await
    }
}

async fn write_report(directory: &Path, report: &Report, extension: &str, contents: String) -> Result<PathBuf> {
    fs::create_dir_all(directory).await.map_err(|e| {
        ScraperError::ExportError(format!("cannot create {}: {}", directory.display(), e))
    })?;

    let path = directory.join(report_file_name(report, extension));
    fs::write(&path, contents).await?;
    info!(path = %path.display(), "Wrote report");

    Ok(path)
}

/// `news_report_<topic-slug>_<YYYYmmdd_HHMMSS>.<extension>`
pub fn report_file_name(report: &Report, extension: &str) -> String {
    format!(
        "news_report_{}_{}.{}",
        slugify(&report.topic),
        report.generated_at.format("%Y%m%d_%H%M%S"),
        extension
    )
}

/// Lowercase ASCII alphanumerics joined by underscores, at most 40 characters.
fn slugify(topic: &str) -> String {
    let slug = topic
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");

    match slug.len() {
        0 => "topic".to_string(),
        len if len > 40 => slug[..40].trim_end_matches('_').to_string(),
        _ => slug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn article(url: &str, host: &str, words: usize) -> Article {
        Article {
            url: url.to_string(),
            title: Some(format!("Title of {}", url)),
            body_text: vec!["word"; words].join(" "),
            extraction_confidence: 0.5,
            word_count: words,
            source_host: host.to_string(),
            metadata: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    fn sample_report() -> Report {
        let batch = ScrapeBatchResult {
            articles: vec![
                article("https://a.com/1", "a.com", 100),
                article("https://b.com/1", "b.com", 50),
                article("https://a.com/2", "a.com", 150),
            ],
            failures: vec![
                ScrapeFailure {
                    url: "https://c.com/1".to_string(),
                    reason: FailureReason::Blocked,
                },
                ScrapeFailure {
                    url: "https://d.com/1".to_string(),
                    reason: FailureReason::LimitReached,
                },
            ],
        };
        let searched = vec![SearchResult {
            title: "Search title".to_string(),
            url: "https://a.com/1".to_string(),
            snippet: "Snippet".to_string(),
        }];

        Report::new(
            "Electric Cars: 2025?",
            &searched,
            batch,
            vec![Some("A short summary.".to_string())],
            Some("Overall analysis.".to_string()),
            2,
        )
    }

    #[test]
    fn test_report_stats() {
        let report = sample_report();
        let stats = &report.stats;

        assert_eq!(stats.articles_found, 1);
        assert_eq!(stats.articles_scraped, 4);
        assert_eq!(stats.successful_scrapes, 3);
        assert_eq!(stats.success_rate, 0.75);
        assert_eq!(stats.total_words, 300);
        assert_eq!(stats.average_words, 100.0);
        assert_eq!(stats.summaries_generated, 1);
        assert_eq!(stats.shortest_words, 50);
        assert_eq!(stats.longest_words, 150);
        assert_eq!(stats.median_words, 100);
        assert!((stats.words_std_dev - 40.82).abs() < 0.01);
        assert_eq!(stats.sources, vec![("a.com".to_string(), 2), ("b.com".to_string(), 1)]);
    }

    #[test]
    fn test_report_entries() {
        let report = sample_report();

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].search_title.as_deref(), Some("Search title"));
        assert_eq!(report.entries[0].summary.as_deref(), Some("A short summary."));
        assert!(report.entries[1].summary.is_none());
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_markdown_rendering() {
        let md = sample_report().to_markdown();

        assert!(md.starts_with("# News Report: Electric Cars: 2025?"));
        assert!(md.contains("| Success Rate | 75% |"));
        assert!(md.contains("## Analysis\n\nOverall analysis."));
        assert!(md.contains("A short summary."));
        assert!(md.contains("| a.com | 2 | 66.7% |"));
        assert!(md.contains("- https://c.com/1 (blocked)"));
        assert!(!md.contains("d.com"));
    }

    #[test]
    fn test_median_takes_upper_middle() {
        let articles: Vec<_> = [10, 40, 20, 30]
            .iter()
            .map(|&w| article("https://a.com", "a.com", w))
            .collect();
        let stats = ReportStats::compute(4, &articles, 0, &[]);

        assert_eq!(stats.median_words, 30);
        assert_eq!(stats.shortest_words, 10);
        assert_eq!(stats.longest_words, 40);
    }

    #[test]
    fn test_empty_distribution() {
        let stats = ReportStats::compute(0, &[], 0, &[]);
        assert_eq!(stats.median_words, 0);
        assert_eq!(stats.words_std_dev, 0.0);
    }

    #[test]
    fn test_distribution_and_briefing_rendering() {
        let md = sample_report()
            .with_summary_report(Some("**Executive Summary**\nThings happened.".to_string()))
            .to_markdown();

        assert!(md.contains("### Content Distribution"));
        assert!(md.contains("- Median Length: 100 words"));
        assert!(md.contains("- Standard Deviation: 40.8 words"));
        assert!(md.contains("## Executive Report\n\n**Executive Summary**\nThings happened."));
    }

    #[test]
    fn test_basic_summary_report() {
        let articles = vec![
            article("https://a.com/1", "a.com", 120),
            article("https://b.com/1", "b.com", 80),
        ];
        let digest = format!("Article 1: First\n{}", "x".repeat(2000));
        let report = basic_summary_report("solar power", &articles, &digest, "no API key configured");

        assert!(report.starts_with("**Executive Summary**\nAnalysis of 2 articles about solar power."));
        assert!(report.contains("a total of 200 words analyzed"));
        assert!(report.contains("**Key Developments**\nArticle 1: First"));
        assert!(report.ends_with("**Note**: Full AI analysis unavailable (no API key configured)"));
        assert!(report.len() < 1400);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Electric Cars: 2025?"), "electric_cars_2025");
        assert_eq!(slugify("!!!"), "topic");
        assert!(slugify(&"long topic ".repeat(10)).len() <= 40);
    }

    #[tokio::test]
    async fn test_json_export() {
        let dir = std::env::temp_dir().join(format!("newsbrief-report-{}", std::process::id()));
        let report = sample_report();

        let path = JsonExporter::new(&dir).export(&report).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("news_report_electric_cars_2025_"));
        assert!(name.ends_with(".json"));

        let written: Report = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.topic, report.topic);
        assert_eq!(written.entries.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_markdown_export() {
        let dir = std::env::temp_dir().join(format!("newsbrief-md-{}", std::process::id()));

        let path = exporter_for(OutputFormat::Markdown, &dir)
            .export(&sample_report())
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "md");
        assert!(std::fs::read_to_string(&path).unwrap().contains("## Articles"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
