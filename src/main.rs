use anyhow::Context;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use newsbrief::{
    config::{AppConfig, OutputFormat},
    pipeline::{Pipeline, RunOptions},
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Search the news on a topic, scrape the articles and write a report.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The news topic to search for
    topic: String,

    /// Optional config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of articles to search for [default: search.max_results, 20]
    #[arg(short, long)]
    search_count: Option<usize>,

    /// Number of articles to scrape [default: scrape.max_articles, 15]
    #[arg(short = 'n', long)]
    scrape_count: Option<usize>,

    /// Number of articles in the detailed report (defaults to the scrape count)
    #[arg(short, long)]
    report_detail: Option<usize>,

    /// Report format
    #[arg(short, long, value_parser = ["json", "markdown"])]
    format: Option<String>,

    /// Directory the report is written to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pages fetched concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Overall scraping deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Skip AI summaries even when an API key is available
    #[arg(long)]
    no_summary: bool,

    /// API key for the OpenAI-compatible endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(format) = self.format.as_deref() {
            config.output.format = match format {
                "markdown" => OutputFormat::Markdown,
                _ => OutputFormat::Json,
            };
        }
        if let Some(output) = &self.output {
            config.output.directory = output.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.scrape.concurrency = concurrency;
        }
        if let Some(deadline) = self.deadline {
            config.scrape.deadline_secs = deadline;
        }
        if self.api_key.is_some() {
            config.llm.api_key = self.api_key.clone();
        }
    }
}

fn spinner(progress: &MultiProgress) -> anyhow::Result<ProgressBar> {
    let pb = progress.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// The main entry point of the application.
///
/// Initializes logging, loads the configuration, runs the pipeline for the
/// topic given on the command line and prints a short summary of the run.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);
    debug!(?config.scrape, ?config.output, "Configuration loaded");

    let start_time = Instant::now();
    let progress = MultiProgress::new();

    let mut pipeline = Pipeline::from_config(&config)
        .context("failed to build the pipeline")?
        .with_progress(spinner(&progress)?)
        .with_scrape_progress(progress.add(ProgressBar::new(0)));
    if cli.no_summary {
        pipeline = pipeline.without_summarizer();
    }

    let options = RunOptions {
        search_count: cli.search_count,
        scrape_count: cli.scrape_count,
        report_detail: cli.report_detail,
    };

    let summary = match pipeline.run(&cli.topic, &options).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Analysis failed: {}", e);
            return Err(e.into());
        }
    };

    let stats = &summary.report.stats;
    let elapsed = start_time.elapsed();

    let Some(path) = summary.path else {
        println!("Could not find articles about: {}", cli.topic);
        return Ok(());
    };

    println!("\n=== News Report Summary ===");
    println!("Topic: {}", summary.report.topic);
    println!("Processing time: {:.2?}", elapsed);
    println!("Articles searched: {}", stats.articles_found);
    println!("Articles scraped: {}", stats.articles_scraped);
    println!("Successful extractions: {}", stats.successful_scrapes);
    println!("Total words analyzed: {}", stats.total_words);
    println!("AI summaries generated: {}", stats.summaries_generated);
    println!("\nReport: {}", path.display());

    Ok(())
}
