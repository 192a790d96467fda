// src/ingest/mod.rs
pub mod newsapi;

pub use newsapi::{FetchQuery, NewsApiClient};

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_TEXT_CHARS: usize = 1500;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize article text: decode entities, strip tags, fold typographic quotes, collapse
/// whitespace. Punctuation is kept since it is part of the headline.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let out = RE_WS.replace_all(&quoted, " ");
    let out = out.trim();

    if out.chars().count() > MAX_TEXT_CHARS {
        out.chars().take(MAX_TEXT_CHARS).collect()
    } else {
        out.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            normalize_text("<p>Stocks &amp; bonds <b>rally</b></p>"),
            "Stocks & bonds rally"
        );
    }

    #[test]
    fn collapses_whitespace_and_quotes() {
        assert_eq!(
            normalize_text("  \u{201C}Big\u{201D}\n\n news\t\u{2019}24  "),
            "\"Big\" news '24"
        );
    }

    #[test]
    fn keeps_sentence_punctuation() {
        assert_eq!(normalize_text("Is AI a bubble?"), "Is AI a bubble?");
    }

    #[test]
    fn caps_length() {
        let long = "a".repeat(MAX_TEXT_CHARS + 10);
        assert_eq!(normalize_text(&long).chars().count(), MAX_TEXT_CHARS);
    }
}
