//! Remote language-model backends. Each sends one prompt per text and strictly parses a
//! `{"label": ..., "score": ...}` reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SentimentBackend;
use crate::config::ClassifierConfig;
use crate::error::ClassificationFailure;
use crate::types::{Sentiment, SentimentLabel};

const USER_AGENT: &str = concat!("news-sentiment-pipeline/", env!("CARGO_PKG_VERSION"));

const OPENAI_BASE: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

const SYSTEM_PROMPT: &str = "You classify the sentiment of news headlines. \
Reply with a single JSON object and nothing else: \
{\"label\": \"positive\" | \"neutral\" | \"negative\", \"score\": <number from -1.0 to 1.0>}.";

pub fn build_prompt(text: &str) -> String {
    format!("{SYSTEM_PROMPT}\nHeadline: {text:?}")
}

#[derive(Deserialize)]
struct Verdict {
    label: String,
    score: f64,
}

/// Strict parse of a model reply. A single surrounding Markdown code fence is tolerated;
/// anything else that is not exactly a `{label, score}` object is rejected.
pub fn parse_verdict(raw: &str) -> Result<Sentiment, ClassificationFailure> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(ClassificationFailure::Empty);
    }
    let v: Verdict = serde_json::from_str(body)
        .map_err(|e| ClassificationFailure::Unparseable(e.to_string()))?;
    let label: SentimentLabel = v
        .label
        .parse()
        .map_err(ClassificationFailure::Unparseable)?;
    if !v.score.is_finite() || !(-1.0..=1.0).contains(&v.score) {
        return Err(ClassificationFailure::Unparseable(format!(
            "score {} outside [-1, 1]",
            v.score
        )));
    }
    Ok(Sentiment::new(label, v.score))
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string ("json") on the opening line.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn http_client(cfg: &ClassifierConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(5))
        .timeout(cfg.request_timeout)
        .build()
        .context("building HTTP client for remote classifier")
}

fn transport(e: reqwest::Error) -> ClassificationFailure {
    if e.is_decode() {
        ClassificationFailure::Unparseable(e.to_string())
    } else {
        ClassificationFailure::Transport(e.to_string())
    }
}

fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ClassificationFailure> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ClassificationFailure::Status(status.as_u16()))
    }
}

/// OpenAI Chat Completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    url: String,
}

impl OpenAiBackend {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self> {
        let base = cfg.endpoint.as_deref().unwrap_or(OPENAI_BASE);
        Ok(Self {
            http: http_client(cfg)?,
            api_key: cfg.api_key.clone(),
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SentimentBackend for OpenAiBackend {
    async fn score(&self, text: &str) -> Result<Sentiment, ClassificationFailure> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ClassificationFailure::MissingCredentials("openai"));
        };

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let user = format!("Headline: {text:?}");
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.0,
            max_tokens: 60,
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(key)
            .json(&req)
            .send()
            .await
            .map_err(transport)?;
        let body: Resp = checked(resp)?.json().await.map_err(transport)?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ClassificationFailure::Empty)?;
        parse_verdict(&content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Google Gemini `generateContent` backend.
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl GeminiBackend {
    pub fn new(cfg: &ClassifierConfig) -> Result<Self> {
        let base = cfg.endpoint.as_deref().unwrap_or(GEMINI_BASE);
        let model = cfg.model.as_deref().unwrap_or(GEMINI_DEFAULT_MODEL);
        let model = model.strip_prefix("models/").unwrap_or(model);
        Ok(Self {
            http: http_client(cfg)?,
            api_key: cfg.api_key.clone(),
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                base.trim_end_matches('/'),
                model
            ),
        })
    }
}

#[async_trait]
impl SentimentBackend for GeminiBackend {
    async fn score(&self, text: &str) -> Result<Sentiment, ClassificationFailure> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ClassificationFailure::MissingCredentials("gemini"));
        };

        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<Content>,
        }
        #[derive(Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }
        #[derive(Deserialize)]
        struct Part {
            text: Option<String>,
        }

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(text) }] }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json"
            }
        });

        let resp = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let parsed: Resp = checked(resp)?.json().await.map_err(transport)?;
        let content = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or(ClassificationFailure::Empty)?;
        parse_verdict(&content)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn is_remote(&self) -> bool {
        true
    }
}
