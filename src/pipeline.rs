//! Stage wiring. Every stage takes a complete in-memory input and returns a complete
//! output; reading and writing files is left to the caller.

use std::collections::HashSet;

use anyhow::Result;

use crate::aggregate::aggregate_daily;
use crate::classify::{BatchReport, Classifier};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::forecast::Forecaster;
use crate::monitor::{Monitor, MonitorStatus};
use crate::notify::{DeliveryOutcome, Notifier, WebhookNotifier};
use crate::types::{Article, ArticleRecord, DailyPoint, ForecastPoint};

/// Outputs of the stages downstream of classification.
#[derive(Debug)]
pub struct Analysis {
    pub daily: Vec<DailyPoint>,
    /// `InsufficientHistory` aborts only this stage.
    pub forecast: Result<Vec<ForecastPoint>, PipelineError>,
    pub status: MonitorStatus,
}

#[derive(Debug)]
pub struct RunReport {
    pub batch: BatchReport,
    /// Prior records followed by newly classified ones not already present.
    pub records: Vec<ArticleRecord>,
    pub analysis: Analysis,
    /// `None` unless the monitor raised an alert.
    pub delivery: Option<Result<DeliveryOutcome, PipelineError>>,
}

pub struct Pipeline {
    classifier: Classifier,
    forecaster: Forecaster,
    monitor: Monitor,
    notifier: Box<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        cfg: &PipelineConfig,
        classifier: Classifier,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            classifier,
            forecaster: Forecaster::new(cfg.forecast),
            monitor: Monitor::new(cfg.monitor),
            notifier,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let classifier = Classifier::from_config(&cfg.classifier)?;
        let notifier = Box::new(WebhookNotifier::new(cfg.webhook_url.clone()));
        Ok(Self::new(cfg, classifier, notifier))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn forecaster(&self) -> &Forecaster {
        &self.forecaster
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub async fn classify(&self, articles: &[Article], full_text: bool) -> BatchReport {
        self.classifier.classify_batch(articles, full_text).await
    }

    /// Aggregate, forecast and evaluate the window over one record set.
    pub fn analyze(&self, records: &[ArticleRecord]) -> Analysis {
        let daily = aggregate_daily(records);
        let forecast = self.forecaster.forecast(&daily);
        if let Err(e) = &forecast {
            tracing::warn!(error = %e, "forecast stage skipped");
        }
        let status = self.monitor.evaluate(records);
        Analysis {
            daily,
            forecast,
            status,
        }
    }

    /// Deliver the alert carried by `status`, if any. Failures are logged and returned,
    /// never escalated.
    pub async fn notify(
        &self,
        status: &MonitorStatus,
    ) -> Option<Result<DeliveryOutcome, PipelineError>> {
        let alert = status.alert()?;
        let result = self.notifier.send(alert).await;
        if let Err(e) = &result {
            tracing::warn!(notifier = self.notifier.name(), error = %e, "alert not delivered");
        }
        Some(result)
    }

    /// Classify `articles`, fold them into `prior`, then run every downstream stage.
    pub async fn run(
        &self,
        articles: &[Article],
        prior: Vec<ArticleRecord>,
        full_text: bool,
    ) -> RunReport {
        let batch = self.classify(articles, full_text).await;
        let records = merge_records(prior, &batch.records);
        let analysis = self.analyze(&records);
        let delivery = self.notify(&analysis.status).await;
        tracing::info!(
            classified = batch.records.len(),
            fallbacks = batch.fallbacks,
            total_records = records.len(),
            days = analysis.daily.len(),
            critical = analysis.status.is_critical(),
            "run complete"
        );
        RunReport {
            batch,
            records,
            analysis,
            delivery,
        }
    }
}

/// Append-only merge: ids already present in `prior` keep their stored version.
pub fn merge_records(prior: Vec<ArticleRecord>, fresh: &[ArticleRecord]) -> Vec<ArticleRecord> {
    let mut seen: HashSet<String> = prior.iter().map(|r| r.id.clone()).collect();
    let mut out = prior;
    for r in fresh {
        if seen.insert(r.id.clone()) {
            out.push(r.clone());
        }
    }
    out
}
