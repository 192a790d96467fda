//! Synthetic history for exercising the forecaster when only a day or two of real data
//! exists. Every record is replayed onto each of `days` consecutive days ending at the
//! earliest observed day, with its score jittered.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::ArticleRecord;

pub const DEFAULT_DAYS: u32 = 7;
pub const JITTER: f64 = 0.15;

#[derive(Debug, Clone, Copy)]
pub struct SynthOptions {
    pub days: u32,
    pub seed: u64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            seed: 42,
        }
    }
}

/// Output is sorted by timestamp (stable, so same-instant copies keep input order).
/// Empty input or `days == 0` yields an empty set.
pub fn mock_history(records: &[ArticleRecord], opts: SynthOptions) -> Vec<ArticleRecord> {
    let Some(earliest) = records.iter().map(ArticleRecord::day).min() else {
        return Vec::new();
    };
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut out = Vec::with_capacity(records.len() * opts.days as usize);

    for offset in 0..opts.days {
        let day = earliest - Duration::days(i64::from(offset));
        for r in records {
            let jitter = rng.random_range(-JITTER..=JITTER);
            out.push(ArticleRecord {
                id: format!("{}~{offset}", r.id),
                published_at: on_day(r, day),
                sentiment_score: (r.sentiment_score + jitter).clamp(-1.0, 1.0),
                ..r.clone()
            });
        }
    }

    out.sort_by_key(|r| r.published_at);
    tracing::info!(
        input = records.len(),
        output = out.len(),
        days = opts.days,
        first_day = %day_string(earliest - Duration::days(i64::from(opts.days.saturating_sub(1)))),
        "synthesized history"
    );
    out
}

fn on_day(r: &ArticleRecord, day: NaiveDate) -> chrono::DateTime<chrono::Utc> {
    day.and_time(r.published_at.time()).and_utc()
}

fn day_string(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
