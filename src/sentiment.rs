//! Lexicon polarity scorer. Deterministic, offline, bounded latency.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::Sentiment;

static LEXICON: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, f64>>(raw).expect("valid sentiment lexicon")
});

/// Multiplier applied to a word negated within the previous three tokens.
const NEGATION_FACTOR: f64 = -0.5;

#[derive(Debug, Clone, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_polarity(&self, w: &str) -> Option<f64> {
        LEXICON.get(w).copied()
    }

    /// Mean polarity of lexicon words in `text`, clamped to [-1, 1], plus the matched word count.
    pub fn polarity(&self, text: &str) -> (f64, usize) {
        // Indexed backwards for negators and intensifiers.
        let tokens: Vec<String> = tokenize(text).collect();
        let mut sum = 0.0;
        let mut matched = 0usize;

        for i in 0..tokens.len() {
            let Some(base) = self.word_polarity(tokens[i].as_str()) else {
                continue;
            };

            let mut p = base;
            if i >= 1 {
                if let Some(boost) = intensifier(tokens[i - 1].as_str()) {
                    p *= boost;
                }
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            if negated {
                p *= NEGATION_FACTOR;
            }

            sum += p;
            matched += 1;
        }

        if matched == 0 {
            return (0.0, 0);
        }
        ((sum / matched as f64).clamp(-1.0, 1.0), matched)
    }

    pub fn score(&self, text: &str) -> Sentiment {
        let (p, _) = self.polarity(text);
        Sentiment::from_polarity(p)
    }
}

/// Alphanumeric tokens, lower-cased. Apostrophes stay inside words so "isn't" survives.
fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "doesn't"
            | "without"
    )
}

fn intensifier(tok: &str) -> Option<f64> {
    match tok {
        "very" | "really" | "extremely" => Some(1.3),
        "highly" | "hugely" | "deeply" => Some(1.2),
        "slightly" | "somewhat" => Some(0.6),
        _ => None,
    }
}
