pub mod webhook;

pub use webhook::WebhookNotifier;

use crate::error::PipelineError;
use crate::monitor::CriticalSentimentAlert;
use crate::store::format_timestamp;

/// What happened to an alert handed to a notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// No endpoint configured; the alert was only logged.
    NotConfigured,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &CriticalSentimentAlert) -> Result<DeliveryOutcome, PipelineError>;
    fn name(&self) -> &'static str;
}

/// Plain-text alert body shared by every transport.
pub fn format_alert_message(alert: &CriticalSentimentAlert) -> String {
    let worst = &alert.most_negative;
    format!(
        "Critical sentiment: mean {:.3} <= threshold {:.3} over the last {}h ({} articles, {} to {})\n\
         Most negative: \"{}\" ({:.3}, {}){}",
        alert.mean,
        alert.threshold,
        alert.window_hours,
        alert.record_count,
        format_timestamp(&alert.window.start),
        format_timestamp(&alert.window.end),
        worst.title,
        worst.sentiment_score,
        format_timestamp(&worst.published_at),
        worst
            .url
            .as_deref()
            .map(|u| format!("\n{u}"))
            .unwrap_or_default(),
    )
}
