use crate::config::LLMConfig;
use crate::prompt::PromptBuilder;
use crate::types::Article;
use crate::{Result, ScraperError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Turns article text into a condensed summary.
///
/// Summaries are additive: a missing or failing summarizer never prevents
/// articles from being produced.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;

    /// Writes an overall analysis of `topic` from the given articles.
    async fn analyze(&self, topic: &str, articles: &[Article]) -> Result<String> {
        let prompt = PromptBuilder::new(topic)
            .with_articles(articles.to_vec())
            .build();
        self.summarize(&prompt).await
    }

    /// Writes an executive briefing from a digest of the article summaries.
    async fn report(&self, topic: &str, article_count: usize, digest: &str) -> Result<String> {
        self.summarize(&PromptBuilder::report(topic, article_count, digest))
            .await
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct LLMProcessor {
    client: Client,
    config: LLMConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

const SUMMARY_SYSTEM: &str = "You are an expert news summarizer. Provide concise, factual summaries.";
const REPORT_SYSTEM: &str = "You are an expert news analyst creating executive-level reports. Be comprehensive, insightful, and professional.";
const ANALYSIS_SYSTEM: &str = "You are an expert news analyst. Provide thorough, factual analysis based on the provided articles.";

impl LLMProcessor {
    /// Creates a new `LLMProcessor`.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, model, token budgets and the optional API key.
    ///
    /// # Returns
    ///
    /// A `Result` containing the new `LLMProcessor`, or an error if the HTTP client cannot be built.
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ScraperError::RequestError)?;

        Ok(Self { client, config })
    }

    /// Sends one chat completion and returns the trimmed reply.
    #[instrument(skip(self, prompt), fields(prompt_length = prompt.len(), model = %self.config.model))]
    pub async fn process(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScraperError::LLMError(format!("API error {}: {}", status, body)));
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ScraperError::LLMError("response has no content".to_string()))?;

        debug!(reply_length = content.len(), "LLM reply received");
        Ok(content)
    }
}

#[async_trait]
impl Summarizer for LLMProcessor {
    async fn summarize(&self, text: &str) -> Result<String> {
        self.process(SUMMARY_SYSTEM, &PromptBuilder::summary(text), self.config.max_tokens)
            .await
    }

    async fn analyze(&self, topic: &str, articles: &[Article]) -> Result<String> {
        let prompt = PromptBuilder::new(topic)
            .with_articles(articles.to_vec())
            .build();
        self.process(ANALYSIS_SYSTEM, &prompt, self.config.analysis_max_tokens)
            .await
    }

    async fn report(&self, topic: &str, article_count: usize, digest: &str) -> Result<String> {
        let prompt = PromptBuilder::report(topic, article_count, digest);
        self.process(REPORT_SYSTEM, &prompt, self.config.report_max_tokens)
            .await
    }
}
