//! # Threshold Monitor
//! Mean sentiment over the most recent window of records, measured back from the newest
//! record in the data (never from wall-clock time, since the data is historical).
//!
//! Pure: produces a [`MonitorStatus`]; delivering an alert is the notifier's job.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::types::ArticleRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalSentimentAlert {
    pub mean: f64,
    pub threshold: f64,
    pub window: Window,
    pub window_hours: u32,
    pub record_count: usize,
    /// Lowest-scoring record in the window; the earliest in input order wins ties.
    pub most_negative: ArticleRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MonitorStatus {
    /// No records at all, so no window can be formed.
    NoData { window_hours: u32 },
    Ok {
        mean: f64,
        threshold: f64,
        window: Window,
        record_count: usize,
    },
    Critical(CriticalSentimentAlert),
}

impl MonitorStatus {
    pub fn alert(&self) -> Option<&CriticalSentimentAlert> {
        match self {
            MonitorStatus::Critical(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, MonitorStatus::Critical(_))
    }
}

#[derive(Debug, Clone)]
pub struct Monitor {
    cfg: MonitorConfig,
}

impl Monitor {
    pub fn new(cfg: MonitorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    /// Window bounds for a record set: `[newest - window_hours, newest]`.
    pub fn window_for(&self, records: &[ArticleRecord]) -> Option<Window> {
        let end = records.iter().map(|r| r.published_at).max()?;
        Some(Window {
            start: end - Duration::hours(i64::from(self.cfg.window_hours)),
            end,
        })
    }

    pub fn evaluate(&self, records: &[ArticleRecord]) -> MonitorStatus {
        let Some(window) = self.window_for(records) else {
            tracing::info!(window_hours = self.cfg.window_hours, "no data in window");
            return MonitorStatus::NoData {
                window_hours: self.cfg.window_hours,
            };
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        let mut lowest: Option<&ArticleRecord> = None;
        for r in records.iter().filter(|r| r.published_at >= window.start) {
            sum += r.sentiment_score;
            count += 1;
            // Strict `<` keeps the first occurrence on ties.
            if lowest.map_or(true, |l| r.sentiment_score < l.sentiment_score) {
                lowest = Some(r);
            }
        }

        // `end` is the newest record, so the window always holds at least that one.
        let Some(lowest) = lowest else {
            return MonitorStatus::NoData {
                window_hours: self.cfg.window_hours,
            };
        };
        let mean = sum / count as f64;
        let threshold = self.cfg.critical_threshold;

        tracing::info!(
            mean,
            threshold,
            records = count,
            window_hours = self.cfg.window_hours,
            "window evaluated"
        );

        if mean <= threshold {
            counter!("alerts_raised_total").increment(1);
            MonitorStatus::Critical(CriticalSentimentAlert {
                mean,
                threshold,
                window,
                window_hours: self.cfg.window_hours,
                record_count: count,
                most_negative: lowest.clone(),
            })
        } else {
            MonitorStatus::Ok {
                mean,
                threshold,
                window,
                record_count: count,
            }
        }
    }
}
