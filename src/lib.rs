// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Stages, leaf-first
pub mod sentiment;
pub mod classify;
pub mod aggregate;
pub mod forecast;
pub mod monitor;

// Collaborators at the process boundary
pub mod ingest;
pub mod metrics;
pub mod notify;

// Tooling around the record file
pub mod summary;
pub mod synth;

pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::aggregate_daily;
pub use crate::classify::{Classifier, SentimentBackend};
pub use crate::config::PipelineConfig;
pub use crate::error::{ClassificationFailure, MalformedRecord, PipelineError};
pub use crate::forecast::Forecaster;
pub use crate::monitor::{CriticalSentimentAlert, Monitor, MonitorStatus};
pub use crate::notify::{DeliveryOutcome, Notifier, WebhookNotifier};
pub use crate::pipeline::Pipeline;
pub use crate::types::{
    Article, ArticleRecord, DailyPoint, ForecastPoint, Sentiment, SentimentLabel,
};
