//! Sentiment classifier: pluggable scoring backends behind a never-failing facade.
//!
//! The facade owns three rules that hold for every backend:
//! - texts shorter than `min_text_len` are neutral/0.0 and never reach a backend,
//! - any backend failure degrades to neutral/0.0 (logged, counted, never propagated),
//! - remote backends are called strictly in sequence with at least `call_delay` between calls.

pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{BackendKind, ClassifierConfig};
use crate::error::ClassificationFailure;
use crate::sentiment::LexiconScorer;
use crate::types::{Article, ArticleRecord, Sentiment};

pub use remote::{parse_verdict, GeminiBackend, OpenAiBackend};

/// A scoring strategy. Implementations may fail; the [`Classifier`] absorbs failures.
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    async fn score(&self, text: &str) -> Result<Sentiment, ClassificationFailure>;

    fn name(&self) -> &'static str;

    /// Remote backends are rate-limited by the classifier.
    fn is_remote(&self) -> bool {
        false
    }
}

/// Offline polarity scoring; always succeeds.
#[derive(Debug, Clone, Default)]
pub struct LexiconBackend {
    scorer: LexiconScorer,
}

#[async_trait]
impl SentimentBackend for LexiconBackend {
    async fn score(&self, text: &str) -> Result<Sentiment, ClassificationFailure> {
        Ok(self.scorer.score(text))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Text too short; no backend consulted.
    ShortText,
    Backend,
    /// Backend failed; neutral default substituted.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classified {
    pub sentiment: Sentiment,
    pub provenance: Provenance,
}

/// Result of classifying a batch of articles.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<ArticleRecord>,
    pub short_text: usize,
    pub fallbacks: usize,
}

pub struct Classifier {
    backend: Box<dyn SentimentBackend>,
    min_text_len: usize,
    call_delay: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl Classifier {
    pub fn new(backend: Box<dyn SentimentBackend>, cfg: &ClassifierConfig) -> Self {
        Self {
            backend,
            min_text_len: cfg.min_text_len,
            call_delay: cfg.call_delay,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    /// Build the backend named by the configuration.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self> {
        let backend: Box<dyn SentimentBackend> = match cfg.backend {
            BackendKind::Lexicon => Box::new(LexiconBackend::default()),
            BackendKind::OpenAi => Box::new(OpenAiBackend::new(cfg)?),
            BackendKind::Gemini => Box::new(GeminiBackend::new(cfg)?),
        };
        if cfg.backend.is_remote() && cfg.api_key.is_none() {
            tracing::warn!(
                backend = %cfg.backend,
                "no API key configured; every item will fall back to neutral"
            );
        }
        tracing::info!(
            backend = backend.name(),
            delay_ms = cfg.call_delay.as_millis() as u64,
            "classifier ready"
        );
        Ok(Self::new(backend, cfg))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Classify one text. Never fails.
    pub async fn classify(&self, text: &str) -> Sentiment {
        self.classify_detailed(text).await.sentiment
    }

    pub async fn classify_detailed(&self, text: &str) -> Classified {
        let text = text.trim();
        if text.chars().count() < self.min_text_len {
            return Classified {
                sentiment: Sentiment::NEUTRAL,
                provenance: Provenance::ShortText,
            };
        }

        let remote = self.backend.is_remote();
        if remote {
            self.wait_for_slot().await;
        }

        let t0 = std::time::Instant::now();
        let result = self.backend.score(text).await;
        counter!("classify_calls_total", "backend" => self.backend.name()).increment(1);
        histogram!("classify_call_ms", "backend" => self.backend.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        if remote && !matches!(result, Err(ClassificationFailure::MissingCredentials(_))) {
            *self.last_call.lock().await = Some(Instant::now());
        }

        match result {
            Ok(s) => Classified {
                sentiment: Sentiment::new(s.label, s.score),
                provenance: Provenance::Backend,
            },
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "classification failed, using neutral");
                counter!("classify_fallback_total", "backend" => self.backend.name()).increment(1);
                Classified {
                    sentiment: Sentiment::NEUTRAL,
                    provenance: Provenance::Fallback,
                }
            }
        }
    }

    /// Sleep until `call_delay` has passed since the previous remote call.
    async fn wait_for_slot(&self) {
        let last = *self.last_call.lock().await;
        if let Some(prev) = last {
            let due = prev + self.call_delay;
            if Instant::now() < due {
                tokio::time::sleep_until(due).await;
            }
        }
    }

    /// Classify articles one after another, in input order.
    pub async fn classify_batch(&self, articles: &[Article], full_text: bool) -> BatchReport {
        let mut report = BatchReport {
            records: Vec::with_capacity(articles.len()),
            ..Default::default()
        };
        let total = articles.len();

        for (i, article) in articles.iter().enumerate() {
            let text = article.classification_text(full_text);
            let out = self.classify_detailed(&text).await;
            match out.provenance {
                Provenance::ShortText => report.short_text += 1,
                Provenance::Fallback => report.fallbacks += 1,
                Provenance::Backend => {}
            }
            tracing::debug!(
                n = i + 1,
                total,
                id = %article.id,
                label = %out.sentiment.label,
                score = out.sentiment.score,
                "classified"
            );
            report
                .records
                .push(ArticleRecord::from_article(article, out.sentiment));
        }

        tracing::info!(
            backend = self.backend.name(),
            classified = report.records.len(),
            short_text = report.short_text,
            fallbacks = report.fallbacks,
            "batch classified"
        );
        report
    }
}
