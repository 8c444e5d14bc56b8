use crate::types::Article;

/// Characters of article text sent for a single summary.
pub const SUMMARY_CONTENT_CHARS: usize = 2000;
/// Characters of article text quoted per article in the analysis prompt.
pub const ANALYSIS_EXCERPT_CHARS: usize = 200;
/// Articles included in the analysis prompt.
pub const ANALYSIS_ARTICLES: usize = 5;

/// The `PromptBuilder` struct is responsible for constructing prompts from scraped articles.
pub struct PromptBuilder {
    /// The topic or question to be included in the prompt.
    query: String,
    /// The articles to be included in the prompt.
    articles: Vec<Article>,
}

impl PromptBuilder {
    /// Creates a new `PromptBuilder` with the given query.
    ///
    /// # Arguments
    ///
    /// * `query` - The topic the analysis is about.
    ///
    /// # Returns
    ///
    /// A new instance of `PromptBuilder` without articles.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            articles: Vec::new(),
        }
    }

    /// Adds the given articles to the `PromptBuilder`.
    ///
    /// # Arguments
    ///
    /// * `articles` - The articles to quote. Only the first few are used.
    ///
    /// # Returns
    ///
    /// The updated `PromptBuilder` instance.
    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        self.articles = articles;
        self
    }

    /// Builds the cross-article analysis prompt.
    ///
    /// # Returns
    ///
    /// A string containing the analysis prompt.
    pub fn build(&self) -> String {
        let context = self
            .articles
            .iter()
            .take(ANALYSIS_ARTICLES)
            .enumerate()
            .map(|(i, article)| {
                format!(
                    "{}. Title: {}\n   Summary: {}...\n   URL: {}",
                    i + 1,
                    article.title.as_deref().unwrap_or("[No Title]"),
                    truncate_chars(&Self::clean_text(&article.body_text), ANALYSIS_EXCERPT_CHARS),
                    article.url
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "Based on these current news articles:\n\n{}\n\nQuestion: Provide key insights about: {}\n\n\
             Please provide a comprehensive analysis based on the news provided. Include:\n\
             1. Direct answer to the question\n\
             2. Supporting evidence from the articles\n\
             3. Any relevant context or implications\n\
             4. Confidence level in your analysis (1-10)",
            context, self.query
        )
    }

    /// Builds the text handed to a summarizer for one article.
    ///
    /// # Arguments
    ///
    /// * `article` - The article to summarize.
    ///
    /// # Returns
    ///
    /// The title and the first characters of the body.
    pub fn article_text(article: &Article) -> String {
        format!(
            "Title: {}\n\nContent: {}",
            article.title.as_deref().unwrap_or("[No Title]"),
            truncate_chars(&article.body_text, SUMMARY_CONTENT_CHARS)
        )
    }

    /// Wraps article text into the summary instruction.
    ///
    /// # Arguments
    ///
    /// * `text` - The article text, usually from [`PromptBuilder::article_text`].
    ///
    /// # Returns
    ///
    /// The summary prompt.
    pub fn summary(text: &str) -> String {
        format!(
            "Summarize this news article concisely:\n\n{}\n\n\
             Provide a clear, factual summary in 3-4 sentences focusing on:\n\
             1. Main news/event\n\
             2. Key details and facts\n\
             3. Any important implications or context",
            text.trim()
        )
    }

    /// Lists every article with its source, length and summary.
    ///
    /// # Arguments
    ///
    /// * `articles` - The scraped articles.
    /// * `summaries` - Summaries indexed like `articles`, possibly shorter.
    ///
    /// # Returns
    ///
    /// One numbered block per article, separated by blank lines.
    pub fn digest(articles: &[Article], summaries: &[Option<String>]) -> String {
        articles
            .iter()
            .enumerate()
            .map(|(i, article)| {
                format!(
                    "Article {}: {}\nSource: {}\nWord Count: {}\nSummary: {}",
                    i + 1,
                    article.title.as_deref().unwrap_or("[No Title]"),
                    article.url,
                    article.word_count,
                    summaries
                        .get(i)
                        .and_then(|s| s.as_deref())
                        .unwrap_or("[No summary available]")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Builds the executive report prompt from an article digest.
    ///
    /// # Arguments
    ///
    /// * `topic` - The topic of the run.
    /// * `article_count` - Number of articles in the digest.
    /// * `digest` - The output of [`PromptBuilder::digest`].
    ///
    /// # Returns
    ///
    /// The prompt asking for a five-section executive briefing.
    pub fn report(topic: &str, article_count: usize, digest: &str) -> String {
        format!(
            "Create a comprehensive news analysis report based on these article summaries:\n\n\
             Topic: {}\n\
             Number of articles analyzed: {}\n\n\
             {}\n\n\
             Generate a professional report with:\n\
             1. **Executive Summary** - Key findings and trends\n\
             2. **Major Themes** - Common topics and patterns\n\
             3. **Key Developments** - Most important news items\n\
             4. **Analysis & Insights** - What these developments mean\n\
             5. **Sources Summary** - Brief overview of sources used\n\n\
             Format as a clear, well-structured report suitable for executive briefing.",
            topic, article_count, digest
        )
    }

    /// Cleans the given text by removing blank lines and normalizing whitespace.
    fn clean_text(text: &str) -> String {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split_whitespace().collect::<Vec<&str>>().join(" "))
            .collect::<Vec<String>>()
            .join(" ")
    }
}

/// Truncates on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn article(url: &str, title: Option<&str>, body: &str) -> Article {
        Article {
            url: url.to_string(),
            title: title.map(String::from),
            body_text: body.to_string(),
            extraction_confidence: 0.8,
            word_count: body.split_whitespace().count(),
            source_host: "example.com".to_string(),
            metadata: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Tests the analysis prompt.
    #[test]
    fn test_prompt_builder() {
        let articles = (1..=7)
            .map(|i| article(&format!("https://example.com/{i}"), Some("Headline"), "Body\n\n  text"))
            .collect();

        let prompt = PromptBuilder::new("electric cars")
            .with_articles(articles)
            .build();

        assert!(prompt.contains("Provide key insights about: electric cars"));
        assert!(prompt.contains("https://example.com/5"));
        assert!(!prompt.contains("https://example.com/6"));
        assert!(prompt.contains("Summary: Body text..."));
    }

    #[test]
    fn test_article_text_is_truncated() {
        let long = "é".repeat(SUMMARY_CONTENT_CHARS + 50);
        let text = PromptBuilder::article_text(&article("https://example.com", None, &long));

        assert!(text.starts_with("Title: [No Title]"));
        assert_eq!(text.chars().filter(|&c| c == 'é').count(), SUMMARY_CONTENT_CHARS);
    }

    #[test]
    fn test_summary_prompt() {
        let prompt = PromptBuilder::summary("  Title: A\n\nContent: B  ");
        assert!(prompt.starts_with("Summarize this news article concisely:\n\nTitle: A"));
        assert!(prompt.contains("3-4 sentences"));
    }

    #[test]
    fn test_digest() {
        let articles = vec![
            article("https://example.com/1", Some("First"), "one two three"),
            article("https://example.com/2", None, "four five"),
        ];
        let digest = PromptBuilder::digest(&articles, &[Some("Summary one.".to_string())]);

        assert_eq!(
            digest,
            "Article 1: First\nSource: https://example.com/1\nWord Count: 3\nSummary: Summary one.\n\n\
             Article 2: [No Title]\nSource: https://example.com/2\nWord Count: 2\nSummary: [No summary available]"
        );
    }

    #[test]
    fn test_report_prompt() {
        let prompt = PromptBuilder::report("solar power", 2, "Article 1: First");

        assert!(prompt.contains("Topic: solar power\nNumber of articles analyzed: 2"));
        assert!(prompt.contains("Article 1: First"));
        assert!(prompt.contains("5. **Sources Summary**"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
