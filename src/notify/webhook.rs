use std::time::Duration;

use metrics::counter;
use reqwest::Client;

use super::{format_alert_message, DeliveryOutcome, Notifier};
use crate::error::PipelineError;
use crate::monitor::CriticalSentimentAlert;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack-compatible incoming-webhook notifier. Any endpoint that accepts a JSON POST works;
/// `text` carries the whole message for receivers that ignore `blocks`.
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self::with_timeout(webhook_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(webhook_url: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "webhook client builder failed, using defaults");
                Client::new()
            });
        Self {
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            client,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

pub fn alert_body(alert: &CriticalSentimentAlert) -> serde_json::Value {
    let text = format_alert_message(alert);
    serde_json::json!({
        "text": text,
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": "Critical news sentiment" }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": text }
            },
            { "type": "divider" }
        ]
    })
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &CriticalSentimentAlert) -> Result<DeliveryOutcome, PipelineError> {
        let Some(url) = &self.webhook_url else {
            tracing::warn!("no webhook URL configured, alert only logged");
            return Ok(DeliveryOutcome::NotConfigured);
        };

        let result = self
            .client
            .post(url)
            .json(&alert_body(alert))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => {
                tracing::info!(mean = alert.mean, "alert delivered");
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => {
                counter!("alert_delivery_failures_total").increment(1);
                Err(PipelineError::DeliveryFailure(e.to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_url_counts_as_unconfigured() {
        assert!(!WebhookNotifier::new(Some("  ".into())).is_configured());
        assert!(!WebhookNotifier::new(None).is_configured());
        assert!(WebhookNotifier::new(Some("http://127.0.0.1:1/hook".into())).is_configured());
    }
}
