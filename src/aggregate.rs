//! # Daily Aggregator
//! Reduces article records to one `(day, mean, count)` point per UTC calendar day.
//!
//! Sparse: days without records are not emitted. Scores are summed in sorted order so the
//! floating-point result does not depend on input order.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::types::{ArticleRecord, DailyPoint};

/// Group by UTC date and average. Output is ascending by day.
pub fn aggregate_daily(records: &[ArticleRecord]) -> Vec<DailyPoint> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for r in records {
        by_day.entry(r.day()).or_default().push(r.sentiment_score);
    }

    by_day
        .into_iter()
        .map(|(day, mut scores)| {
            scores.sort_by(f64::total_cmp);
            let n = scores.len();
            let sum: f64 = scores.iter().sum();
            DailyPoint {
                day,
                mean_score: sum / n as f64,
                article_count: n,
            }
        })
        .collect()
}
