use crate::types::Extraction;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Tags whose subtrees never contain article text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];

/// Tunable thresholds and marker lists for [`ContentExtractor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Paragraphs shorter than this are treated as captions or bylines.
    pub min_paragraph_chars: usize,
    /// Paragraph characters worth one point of container score.
    pub chars_per_point: f64,
    /// Containers scoring below this yield an empty, zero-confidence extraction.
    pub min_score: f64,
    /// Score multiplier for containers inside navigation, footers, ads and the like.
    pub boilerplate_penalty: f64,
    /// Score multiplier for semantic article containers.
    pub semantic_bonus: f64,
    /// Score at which the score half of the confidence reaches 0.5.
    pub score_half: f64,
    /// Word count at which the word half of the confidence reaches 0.5.
    pub words_half: f64,
    pub container_tags: Vec<String>,
    pub boilerplate_tags: Vec<String>,
    /// Matched against class and id tokens.
    pub boilerplate_markers: Vec<String>,
    /// Matched against class and id tokens.
    pub article_markers: Vec<String>,
    /// Tried in order, the first non-empty match wins. `<title>` is the last resort.
    pub title_selectors: Vec<String>,
    pub metadata_selectors: BTreeMap<String, String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            min_paragraph_chars: 25,
            chars_per_point: 100.0,
            min_score: 0.5,
            boilerplate_penalty: 0.2,
            semantic_bonus: 1.5,
            score_half: 1.0,
            words_half: 20.0,
            container_tags: strings(&["article", "main", "section", "div", "td", "body"]),
            boilerplate_tags: strings(&["nav", "footer", "header", "aside", "form", "menu"]),
            boilerplate_markers: strings(&[
                "nav", "menu", "footer", "sidebar", "ad", "ads", "advert", "sponsor", "promo",
                "comment", "share", "social", "related", "cookie", "banner", "subscribe",
                "newsletter", "breadcrumb", "widget", "popup", "modal",
            ]),
            article_markers: strings(&[
                "article", "content", "post", "entry", "story", "body", "text", "main",
            ]),
            title_selectors: strings(&[
                "[itemprop='headline']",
                "article h1",
                "h1.headline",
                "h1",
                ".headline",
                ".article-title",
                "meta[property='og:title']",
                "title",
            ]),
            metadata_selectors: [
                ("description", "meta[name='description'], meta[property='og:description']"),
                ("author", "meta[name='author'], [rel='author'], .author"),
                ("date", "meta[property='article:published_time'], meta[name='date'], time[datetime]"),
                ("site", "meta[property='og:site_name']"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }
}

/// The `ContentExtractor` isolates the main article text of an HTML page.
///
/// Every block container is scored by the amount of paragraph text it holds
/// directly, penalized for boilerplate markers and boosted for semantic article
/// markers. The best container's paragraphs become the article body.
/// Extraction never fails: atypical input degrades to an empty body with zero
/// confidence.
pub struct ContentExtractor {
    config: ExtractorConfig,
    title_selectors: Vec<Selector>,
    metadata_selectors: Vec<(String, Selector)>,
}

/// A scored block container.
struct Candidate<'a> {
    element: ElementRef<'a>,
    score: f64,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl ContentExtractor {
    /// Creates a new `ContentExtractor`. Selectors that fail to parse are dropped.
    pub fn new(config: ExtractorConfig) -> Self {
        let title_selectors = config
            .title_selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();

        let metadata_selectors = config
            .metadata_selectors
            .iter()
            .filter_map(|(key, sel)| {
                Selector::parse(sel)
                    .ok()
                    .map(|selector| (key.clone(), selector))
            })
            .collect();

        Self {
            config,
            title_selectors,
            metadata_selectors,
        }
    }

    /// Extracts title, body text, confidence and metadata from an HTML string.
    ///
    /// # Arguments
    ///
    /// * `html` - The page source. Malformed or empty input is accepted.
    ///
    /// # Returns
    ///
    /// An `Extraction`. When no container scores above the minimum the body is
    /// empty and the confidence is zero.
    #[instrument(skip(self, html), fields(html_length = html.len()))]
    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        let title = self.extract_title(&document);
        let metadata = self.extract_metadata(&document);

        let best = match self.best_candidate(&document) {
            Some(candidate) if candidate.score >= self.config.min_score => candidate,
            _ => {
                debug!("No container scored above the minimum");
                return Extraction {
                    title,
                    body_text: String::new(),
                    confidence: 0.0,
                    metadata,
                };
            }
        };

        let body_text = self.paragraphs(best.element).join("\n\n");
        let word_count = body_text.split_whitespace().count();
        let confidence = self.confidence(best.score, word_count);

        debug!(
            container = best.element.value().name(),
            score = best.score,
            word_count,
            confidence,
            "Selected article container"
        );

        Extraction {
            title,
            body_text,
            confidence,
            metadata,
        }
    }

    /// Same as [`extract`](Self::extract) for raw bytes, decoded lossily as UTF-8.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Extraction {
        self.extract(&String::from_utf8_lossy(bytes))
    }

    /// Walks the tree in document order and keeps the highest scoring container.
    fn best_candidate<'a>(&self, document: &'a Html) -> Option<Candidate<'a>> {
        let mut best: Option<Candidate<'a>> = None;
        let mut stack = vec![(document.root_element(), false)];

        while let Some((element, inherited_boilerplate)) = stack.pop() {
            let name = element.value().name();
            if SKIPPED_TAGS.contains(&name) {
                continue;
            }

            let boilerplate = inherited_boilerplate || self.is_boilerplate(element);

            if self.config.container_tags.iter().any(|t| t == name) {
                let score = self.score(element, boilerplate);
                if score > best.as_ref().map_or(0.0, |b| b.score) {
                    best = Some(Candidate { element, score });
                }
            }

            // reversed so the stack pops children in document order
            let children: Vec<_> = element.children().filter_map(ElementRef::wrap).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, boilerplate)));
        }

        best
    }

    fn score(&self, element: ElementRef<'_>, boilerplate: bool) -> f64 {
        let chars: usize = self
            .paragraphs(element)
            .iter()
            .map(|p| p.chars().count())
            .sum();

        let mut score = chars as f64 / self.config.chars_per_point.max(1.0);
        if boilerplate {
            score *= self.config.boilerplate_penalty;
        }
        if self.is_semantic(element) {
            score *= self.config.semantic_bonus;
        }
        score.max(0.0)
    }

    /// Normalized text of the qualifying direct `<p>` children, in order.
    fn paragraphs(&self, element: ElementRef<'_>) -> Vec<String> {
        element
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "p")
            .map(|p| normalize_whitespace(&p.text().collect::<String>()))
            .filter(|text| text.chars().count() >= self.config.min_paragraph_chars.max(1))
            .collect()
    }

    fn confidence(&self, score: f64, word_count: usize) -> f64 {
        let score_part = saturate(score, self.config.score_half);
        let word_part = saturate(word_count as f64, self.config.words_half);
        (0.5 * score_part + 0.5 * word_part).clamp(0.0, 1.0)
    }

    fn is_boilerplate(&self, element: ElementRef<'_>) -> bool {
        let name = element.value().name();
        if self.config.boilerplate_tags.iter().any(|t| t == name) {
            return true;
        }
        if element.value().attr("role") == Some("navigation") {
            return true;
        }
        marker_tokens(element).any(|token| matches_marker(&token, &self.config.boilerplate_markers))
    }

    fn is_semantic(&self, element: ElementRef<'_>) -> bool {
        let value = element.value();
        if matches!(value.name(), "article" | "main") {
            return true;
        }
        if value.attr("role") == Some("main") || value.attr("itemprop") == Some("articleBody") {
            return true;
        }
        marker_tokens(element).any(|token| matches_marker(&token, &self.config.article_markers))
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        self.title_selectors
            .iter()
            .find_map(|selector| first_value(document, selector))
    }

    fn extract_metadata(&self, document: &Html) -> BTreeMap<String, String> {
        self.metadata_selectors
            .iter()
            .filter_map(|(key, selector)| {
                first_value(document, selector).map(|value| (key.clone(), value))
            })
            .collect()
    }
}

/// The `content` or `datetime` attribute of the first match, or its normalized text.
fn first_value(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(|element| {
        let value = element
            .value()
            .attr("content")
            .or_else(|| element.value().attr("datetime"))
            .map(normalize_whitespace)
            .unwrap_or_else(|| normalize_whitespace(&element.text().collect::<String>()));

        (!value.is_empty()).then_some(value)
    })
}

/// Lowercased alphanumeric tokens of the element's class and id attributes.
fn marker_tokens<'a>(element: ElementRef<'a>) -> impl Iterator<Item = String> + 'a {
    let value = element.value();
    value
        .attr("class")
        .into_iter()
        .chain(value.attr("id"))
        .flat_map(|attr| attr.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

/// Short markers must match a whole token, longer ones also match as a prefix
/// (`nav` matches `navbar`, `ad` does not match `header`).
fn matches_marker(token: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .any(|m| token == m || (m.len() >= 3 && token.starts_with(m.as_str())))
}

fn saturate(value: f64, half: f64) -> f64 {
    if value <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    value / (value + half.max(f64::EPSILON))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: &str = "The city council approved the new transit budget on Tuesday evening after hours of debate.";
    const P2: &str = "Supporters said the plan would add bus routes to neighborhoods that have long been underserved.";
    const P3: &str = "Opponents argued that the cost estimates were optimistic and called for an independent review.";

    fn article_page() -> String {
        let links: String = (0..10)
            .map(|i| format!("<li><a href=\"/section/{i}\">Section {i}</a></li>"))
            .collect();
        format!(
            r#"<!DOCTYPE html>
            <html>
                <head>
                    <title>Council passes budget | Daily Example</title>
                    <meta name="description" content="Transit budget approved">
                    <meta name="author" content="Jane Reporter">
                </head>
                <body>
                    <nav><ul>{links}</ul></nav>
                    <article>
                        <h1>Council passes transit budget</h1>
                        <p>{P1}</p>
                        <p>{P2}</p>
                        <p>{P3}</p>
                    </article>
                </body>
            </html>"#
        )
    }

    #[test]
    fn test_article_extraction() {
        let extractor = ContentExtractor::default();
        let result = extractor.extract(&article_page());

        assert_eq!(result.body_text, format!("{P1}\n\n{P2}\n\n{P3}"));
        assert!(result.confidence > 0.5, "confidence was {}", result.confidence);
        assert_eq!(result.title.as_deref(), Some("Council passes transit budget"));
        assert_eq!(result.metadata.get("author").unwrap(), "Jane Reporter");
        assert_eq!(result.metadata.get("description").unwrap(), "Transit budget approved");
    }

    #[test]
    fn test_title_falls_back_to_document_title() {
        let html = format!(
            "<html><head><title>  Plain   title </title></head><body><div><p>{P1}</p></div></body></html>"
        );
        let result = ContentExtractor::default().extract(&html);
        assert_eq!(result.title.as_deref(), Some("Plain title"));
    }

    #[test]
    fn test_boilerplate_loses_to_article() {
        let html = format!(
            r#"<html><body>
                <div class="comments-section"><p>{P1} {P2}</p><p>{P3} {P1}</p></div>
                <div class="story-body"><p>{P2}</p><p>{P3}</p></div>
            </body></html>"#
        );
        let result = ContentExtractor::default().extract(&html);
        assert_eq!(result.body_text, format!("{P2}\n\n{P3}"));
    }

    #[test]
    fn test_short_paragraphs_are_dropped() {
        let html = format!(
            r#"<html><body><article>
                <p>Photo: AP</p>
                <p>   </p>
                <p>{P1}</p>
                <p>By Staff</p>
                <p>{P2}</p>
            </article></body></html>"#
        );
        let result = ContentExtractor::default().extract(&html);
        assert_eq!(result.body_text, format!("{P1}\n\n{P2}"));
    }

    #[test]
    fn test_empty_and_garbage_input() {
        let extractor = ContentExtractor::default();

        for input in ["", "not html at all", "<<<>>><p", "<html><body><nav><p>x</p></nav></body></html>"] {
            let result = extractor.extract(input);
            assert_eq!(result.body_text, "");
            assert_eq!(result.confidence, 0.0);
        }

        let result = extractor.extract_bytes(&[0xff, 0xfe, 0x00, 0x3c, 0x70, 0x3e, 0x80]);
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn test_navigation_only_page_fails() {
        let html = format!(
            r#"<html><body><nav class="site-nav"><p>{P1}</p><p>{P2}</p></nav></body></html>"#
        );
        let result = ContentExtractor::default().extract(&html);
        assert_eq!(result.confidence, 0.0);
        assert!(result.body_text.is_empty());
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = ContentExtractor::default();
        let page = article_page();
        assert_eq!(extractor.extract(&page), extractor.extract(&page));
    }

    #[test]
    fn test_scripts_are_ignored() {
        let html = format!(
            r#"<html><body><article><p>{P1}</p><script>var p = "<p>{P2}</p>";</script></article></body></html>"#
        );
        let result = ContentExtractor::default().extract(&html);
        assert_eq!(result.body_text, P1);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = ExtractorConfig {
            min_paragraph_chars: 200,
            ..ExtractorConfig::default()
        };
        let result = ContentExtractor::new(config).extract(&article_page());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_marker_matching() {
        let markers = vec!["nav".to_string(), "ad".to_string()];
        assert!(matches_marker("navbar", &markers));
        assert!(matches_marker("ad", &markers));
        assert!(!matches_marker("header", &markers));
        assert!(!matches_marker("adjacent", &markers));
    }
}
