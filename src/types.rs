// src/types.rs
//! Records flowing between pipeline stages.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Polarity at or below this magnitude is labelled neutral.
pub const NEUTRAL_BAND: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    /// Label implied by a polarity score.
    pub fn from_score(score: f64) -> Self {
        if score > NEUTRAL_BAND {
            SentimentLabel::Positive
        } else if score < -NEUTRAL_BAND {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "neutral" => Ok(SentimentLabel::Neutral),
            "negative" => Ok(SentimentLabel::Negative),
            other => Err(format!("unknown sentiment label: {other:?}")),
        }
    }
}

/// A (label, score) verdict. Score is always within [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    pub score: f64,
}

impl Sentiment {
    pub const NEUTRAL: Sentiment = Sentiment {
        label: SentimentLabel::Neutral,
        score: 0.0,
    };

    /// Keep an externally chosen label; the score is forced into range.
    pub fn new(label: SentimentLabel, score: f64) -> Self {
        let score = if score.is_finite() {
            score.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        Self { label, score }
    }

    /// Build from a raw polarity, clamping into range and deriving the label.
    pub fn from_polarity(score: f64) -> Self {
        let s = Self::new(SentimentLabel::Neutral, score);
        Self::new(SentimentLabel::from_score(s.score), s.score)
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// An article waiting to be classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub source: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl Article {
    /// Text handed to the classifier: the title, optionally followed by the description.
    pub fn classification_text(&self, full_text: bool) -> String {
        match (&self.description, full_text) {
            (Some(d), true) if !d.trim().is_empty() => format!("{}. {}", self.title, d),
            _ => self.title.clone(),
        }
    }
}

/// A classified article. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub sentiment_label: SentimentLabel,
    pub sentiment_score: f64,
}

impl ArticleRecord {
    pub fn from_article(article: &Article, sentiment: Sentiment) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            published_at: article.published_at,
            sentiment_label: sentiment.label,
            sentiment_score: sentiment.score,
        }
    }

    /// UTC calendar day the record belongs to.
    pub fn day(&self) -> NaiveDate {
        self.published_at.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub day: NaiveDate,
    pub mean_score: f64,
    pub article_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub day: NaiveDate,
    pub predicted: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Stable record id derived from the article's title and timestamp.
pub fn derive_id(title: &str, published_at: &DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(published_at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.11), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.5), SentimentLabel::Negative);
    }

    #[test]
    fn label_parse_is_case_insensitive() {
        assert_eq!(
            " Negative ".parse::<SentimentLabel>().unwrap(),
            SentimentLabel::Negative
        );
        assert!("meh".parse::<SentimentLabel>().is_err());
    }

    #[test]
    fn polarity_is_clamped_and_nan_is_neutral() {
        assert_eq!(Sentiment::from_polarity(3.0).score, 1.0);
        assert_eq!(Sentiment::from_polarity(f64::NAN), Sentiment::NEUTRAL);
    }

    #[test]
    fn derived_ids_are_stable_and_distinct() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let a = derive_id("Markets rally", &t);
        assert_eq!(a, derive_id("  Markets rally ", &t));
        assert_ne!(a, derive_id("Markets slump", &t));
        assert_eq!(a.len(), 16);
    }
}
