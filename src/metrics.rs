//! Prometheus recorder for CLI runs. There is no scrape endpoint: a run ends by writing
//! the text exposition to a file for a node-exporter textfile collector.

use std::path::Path;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder. Fails if another recorder is already installed.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        describe();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition via a temp file so collectors never read a partial snapshot.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())
            .with_context(|| format!("writing metrics to {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("moving metrics into {}", path.display()))?;
        tracing::debug!(path = %path.display(), "metrics written");
        Ok(())
    }
}

/// One-time descriptions so every series carries HELP text.
pub fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("records_loaded_total", "Records accepted from input files.");
        describe_counter!(
            "records_malformed_total",
            "Rows dropped at ingestion because they failed parsing."
        );
        describe_counter!("classify_calls_total", "Backend classification calls.");
        describe_counter!(
            "classify_fallback_total",
            "Classifications that fell back to neutral after a backend failure."
        );
        describe_histogram!(
            "classify_call_ms",
            Unit::Milliseconds,
            "Latency of one backend classification call."
        );
        describe_counter!("alerts_raised_total", "Critical sentiment alerts raised.");
        describe_counter!(
            "alert_delivery_failures_total",
            "Alerts whose webhook delivery failed."
        );
        describe_counter!("news_articles_fetched_total", "Articles returned by the news source.");
        describe_histogram!(
            "news_fetch_ms",
            Unit::Milliseconds,
            "Latency of one news source request."
        );
    });
}
