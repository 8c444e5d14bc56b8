use newsbrief::config::FetchConfig;
use newsbrief::{
    ContentExtractor, FailureReason, Fetcher, RateLimiter, ScrapeLimits, Scraper,
};
use std::sync::Arc;
use std::time::Duration;

fn story(n: usize) -> String {
    format!(
        r#"<html>
            <head><title>Story {n}</title></head>
            <body>
                <nav><a href="/">Home</a> <a href="/world">World</a> <a href="/tech">Tech</a></nav>
                <article>
                    <h1>Story number {n}</h1>
                    <p>Paragraph one of story {n} explains what happened and who was involved in it.</p>
                    <p>Paragraph two of story {n} adds the reactions of officials and local residents.</p>
                    <p>Paragraph three of story {n} describes what is expected to happen over the next weeks.</p>
                </article>
                <footer><p>Copyright Example News. All rights reserved worldwide.</p></footer>
            </body>
        </html>"#
    )
}

fn scraper() -> Scraper {
    let config = FetchConfig {
        backoff_base_ms: 10,
        backoff_cap_ms: 50,
        ..FetchConfig::default()
    };
    let fetcher = Fetcher::new(&config, Arc::new(RateLimiter::new(Duration::from_millis(10)))).unwrap();
    Scraper::new(fetcher, ContentExtractor::default(), 0.2)
}

fn limits() -> ScrapeLimits {
    ScrapeLimits {
        max_articles: 10,
        timeout: Duration::from_secs(5),
        max_retries: 2,
        concurrency: 3,
        deadline: Some(Duration::from_secs(30)),
    }
}

#[tokio::test]
async fn test_batch_with_one_server_error() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for n in [1, 2, 4, 5] {
        mocks.push(
            server
                .mock("GET", format!("/story/{n}").as_str())
                .with_status(200)
                .with_header("content-type", "text/html; charset=utf-8")
                .with_body(story(n))
                .create_async()
                .await,
        );
    }
    let broken = server
        .mock("GET", "/story/3")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let urls: Vec<String> = (1..=5).map(|n| format!("{}/story/{n}", server.url())).collect();
    let batch = scraper().scrape(&urls, &limits()).await.unwrap();

    assert_eq!(batch.articles.len(), 4);
    assert_eq!(batch.failures.len(), 1);

    let article_urls: Vec<_> = batch.articles.iter().map(|a| a.url.clone()).collect();
    assert_eq!(
        article_urls,
        vec![urls[0].clone(), urls[1].clone(), urls[3].clone(), urls[4].clone()]
    );
    assert_eq!(batch.failures[0].url, urls[2]);
    assert_eq!(batch.failures[0].reason, FailureReason::HttpError(500));

    let first = &batch.articles[0];
    assert_eq!(first.title.as_deref(), Some("Story number 1"));
    assert!(first.body_text.starts_with("Paragraph one of story 1"));
    assert!(!first.body_text.contains("Copyright"));
    assert!(first.extraction_confidence > 0.5);
    assert_eq!(first.source_host, "127.0.0.1");

    broken.assert_async().await;
}

#[tokio::test]
async fn test_unextractable_page_is_a_failure() {
    let mut server = mockito::Server::new_async().await;
    let _good = server
        .mock("GET", "/good")
        .with_status(200)
        .with_body(story(1))
        .create_async()
        .await;
    let _empty = server
        .mock("GET", "/empty")
        .with_status(200)
        .with_body("<html><body><div>Loading...</div></body></html>")
        .create_async()
        .await;

    let urls = vec![
        format!("{}/empty", server.url()),
        format!("{}/good", server.url()),
        "not a url".to_string(),
    ];
    let batch = scraper().scrape(&urls, &limits()).await.unwrap();

    assert_eq!(batch.articles.len(), 1);
    assert_eq!(batch.articles[0].url, urls[1]);

    let reasons: Vec<_> = batch.failures.iter().map(|f| f.reason).collect();
    assert_eq!(reasons, vec![FailureReason::ExtractionFailed, FailureReason::InvalidUrl]);
    assert_eq!(batch.len(), urls.len());
}

#[tokio::test]
async fn test_empty_url_list_is_rejected() {
    let result = scraper().scrape(&[], &limits()).await;
    assert!(result.is_err());
}
