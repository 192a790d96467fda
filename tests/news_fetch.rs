// tests/news_fetch.rs
//
// News fetcher against a local stub of `/v2/everything`.

mod common;

use chrono::{TimeZone, Utc};

use news_sentiment_pipeline::ingest::{FetchQuery, NewsApiClient};

const PAGE: &str = r#"{
  "status": "ok",
  "totalResults": 2,
  "articles": [
    {
      "source": {"id": "wire", "name": "Wire"},
      "title": "Robots &amp; jobs: a <em>bright</em> future",
      "description": "Analysts are upbeat.",
      "url": "https://news.example/robots",
      "publishedAt": "2024-06-01T12:00:00Z"
    },
    {
      "source": {"id": null, "name": "Blog"},
      "title": "",
      "publishedAt": "2024-06-01T13:00:00Z"
    }
  ]
}"#;

#[tokio::test]
async fn fetch_sends_query_and_parses_page() {
    let stub = common::serve(vec![(200, PAGE.to_string())]).await;
    let client = NewsApiClient::new("news-key", Some(stub.base.clone())).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();

    let articles = client
        .fetch(
            &FetchQuery {
                page_size: 500,
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Robots & jobs: a bright future");
    assert_eq!(articles[0].source.as_deref(), Some("Wire"));

    let reqs = stub.requests();
    let line = &reqs[0].request_line;
    assert!(line.starts_with("GET /v2/everything?"), "{line}");
    assert!(line.contains("language=en"), "{line}");
    assert!(line.contains("sortBy=publishedAt"), "{line}");
    assert!(line.contains("from=2024-05-31"), "{line}");
    // Page size is capped at the API maximum.
    assert!(line.contains("pageSize=100"), "{line}");
    assert_eq!(reqs[0].header("x-api-key"), Some("news-key"));
}

#[tokio::test]
async fn api_error_is_reported() {
    let stub = common::serve(vec![(
        401,
        r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#
            .to_string(),
    )])
    .await;
    let client = NewsApiClient::new("bad", Some(stub.base.clone())).unwrap();
    let err = client
        .fetch(&FetchQuery::default(), Utc::now())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("apiKeyInvalid"), "{err:#}");
}
