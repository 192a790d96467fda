// src/ingest/newsapi.rs
//! NewsAPI `/v2/everything` client. One page per fetch; pagination is not needed for a
//! daily batch of at most 100 articles.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::config::env_string;
use crate::ingest::normalize_text;
use crate::store::parse_timestamp;
use crate::types::{derive_id, Article};

pub const ENV_NEWS_API_KEY: &str = "NEWS_API_KEY";
pub const ENV_NEWS_API_ENDPOINT: &str = "NEWS_API_ENDPOINT";

const DEFAULT_BASE: &str = "https://newsapi.org";
pub const DEFAULT_QUERY: &str = "AI OR artificial intelligence";
pub const MAX_PAGE_SIZE: u32 = 100;

/// Title NewsAPI substitutes for articles pulled by the publisher.
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub query: String,
    pub language: String,
    pub days_back: u32,
    pub page_size: u32,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            language: "en".to_string(),
            days_back: 30,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    #[serde(default)]
    source: Option<RawSource>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

pub struct NewsApiClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>, base: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-sentiment-pipeline/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("building HTTP client for news source")?;
        Ok(Self {
            http,
            base: base
                .unwrap_or_else(|| DEFAULT_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }

    /// Key from `NEWS_API_KEY`, base URL from `NEWS_API_ENDPOINT` when set.
    pub fn from_env() -> Result<Self> {
        let Some(key) = env_string(ENV_NEWS_API_KEY) else {
            bail!("{ENV_NEWS_API_KEY} is not set");
        };
        Self::new(key, env_string(ENV_NEWS_API_ENDPOINT))
    }

    pub async fn fetch(&self, q: &FetchQuery, now: DateTime<Utc>) -> Result<Vec<Article>> {
        let from = (now - Duration::days(i64::from(q.days_back)))
            .format("%Y-%m-%d")
            .to_string();
        let page_size = q.page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let url = format!("{}/v2/everything", self.base);

        let t0 = std::time::Instant::now();
        let resp = self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", q.query.as_str()),
                ("language", q.language.as_str()),
                ("sortBy", "publishedAt"),
                ("from", from.as_str()),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .context("news request")?;
        let status = resp.status();
        let body = resp.text().await.context("reading news response")?;
        histogram!("news_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let articles = parse_everything(&body).with_context(|| format!("news API returned {status}"))?;
        counter!("news_articles_fetched_total").increment(articles.len() as u64);
        tracing::info!(count = articles.len(), query = %q.query, from = %from, "fetched articles");
        Ok(articles)
    }
}

/// Parse an `/v2/everything` body into articles. Entries without a usable title or
/// timestamp are skipped.
pub fn parse_everything(body: &str) -> Result<Vec<Article>> {
    let resp: EverythingResponse = serde_json::from_str(body).context("parsing news JSON")?;
    if resp.status != "ok" {
        bail!(
            "news API error {}: {}",
            resp.code.as_deref().unwrap_or("unknown"),
            resp.message.as_deref().unwrap_or("no message")
        );
    }

    let mut out = Vec::with_capacity(resp.articles.len());
    let mut skipped = 0usize;
    for raw in resp.articles {
        let title = raw.title.as_deref().map(normalize_text).unwrap_or_default();
        let Some(published_at) = raw.published_at.as_deref().and_then(parse_timestamp) else {
            skipped += 1;
            continue;
        };
        if title.is_empty() || title == REMOVED_MARKER {
            skipped += 1;
            continue;
        }
        out.push(Article {
            id: derive_id(&title, &published_at),
            title,
            description: raw
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| !d.is_empty()),
            url: raw.url.filter(|u| !u.is_empty()),
            source: raw.source.and_then(|s| s.name),
            published_at,
        });
    }
    if skipped > 0 {
        tracing::debug!(skipped, "dropped articles without title or timestamp");
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "status": "ok",
        "totalResults": 3,
        "articles": [
            {
                "source": {"id": null, "name": "Wire"},
                "author": "x",
                "title": "AI chip sales &amp; profits <b>soar</b>",
                "description": "  Record quarter  ",
                "url": "https://news.example/1",
                "publishedAt": "2024-03-05T08:15:00Z",
                "content": "..."
            },
            {
                "source": {"id": null, "name": "Wire"},
                "title": "[Removed]",
                "publishedAt": "2024-03-05T09:00:00Z"
            },
            {
                "source": {"id": null, "name": "Wire"},
                "title": "No timestamp here",
                "publishedAt": null
            }
        ]
    }"#;

    #[test]
    fn parses_and_filters_articles() {
        let arts = parse_everything(BODY).unwrap();
        assert_eq!(arts.len(), 1);
        let a = &arts[0];
        assert_eq!(a.title, "AI chip sales & profits soar");
        assert_eq!(a.description.as_deref(), Some("Record quarter"));
        assert_eq!(a.source.as_deref(), Some("Wire"));
        assert_eq!(a.id, derive_id(&a.title, &a.published_at));
    }

    #[test]
    fn api_error_status_is_reported() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"bad key"}"#;
        let err = parse_everything(body).unwrap_err().to_string();
        assert!(err.contains("apiKeyInvalid"), "{err}");
    }

    #[test]
    fn default_query_matches_daily_batch() {
        let q = FetchQuery::default();
        assert_eq!(q.page_size, 100);
        assert_eq!(q.language, "en");
        assert_eq!(q.days_back, 30);
    }
}
