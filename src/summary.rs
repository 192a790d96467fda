//! Quick health report of a record file: how much loaded, how much was dropped, which days
//! are covered and how labels are distributed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::Loaded;
use crate::types::{ArticleRecord, SentimentLabel};

const PREVIEW_DAYS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub malformed_rows: usize,
    pub distinct_days: usize,
    pub first_days: Vec<NaiveDate>,
    pub labels: BTreeMap<SentimentLabel, usize>,
}

impl DatasetSummary {
    pub fn from_loaded(loaded: &Loaded<ArticleRecord>) -> Self {
        let mut s = Self::from_records(&loaded.items);
        s.malformed_rows = loaded.malformed_count();
        s
    }

    pub fn from_records(records: &[ArticleRecord]) -> Self {
        let days: BTreeSet<NaiveDate> = records.iter().map(ArticleRecord::day).collect();
        let mut labels = BTreeMap::new();
        for r in records {
            *labels.entry(r.sentiment_label).or_insert(0) += 1;
        }
        Self {
            total_records: records.len(),
            malformed_rows: 0,
            distinct_days: days.len(),
            first_days: days.into_iter().take(PREVIEW_DAYS).collect(),
            labels,
        }
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records: {}", self.total_records)?;
        writeln!(f, "Malformed rows dropped: {}", self.malformed_rows)?;
        writeln!(f, "Distinct days: {}", self.distinct_days)?;
        let days: Vec<String> = self.first_days.iter().map(|d| d.to_string()).collect();
        writeln!(f, "First {} days: {}", PREVIEW_DAYS, days.join(", "))?;
        writeln!(f, "Label distribution:")?;
        for (label, n) in &self.labels {
            writeln!(f, "  {:<8} {n}", label.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_records;

    #[test]
    fn counts_days_labels_and_malformed() {
        let csv = "\
id,title,publishedAt,sentiment_label,sentiment_score
1,a,2024-01-03T10:00:00Z,negative,-0.5
2,b,2024-01-01T10:00:00Z,positive,0.3
3,c,2024-01-01T12:00:00Z,negative,-0.2
4,d,not-a-date,neutral,0.0
";
        let loaded = read_records(csv.as_bytes(), "test").unwrap();
        let s = DatasetSummary::from_loaded(&loaded);
        assert_eq!(s.total_records, 3);
        assert_eq!(s.malformed_rows, 1);
        assert_eq!(s.distinct_days, 2);
        assert_eq!(s.first_days[0], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(s.labels[&SentimentLabel::Negative], 2);
        assert!(!s.labels.contains_key(&SentimentLabel::Neutral));

        let text = s.to_string();
        assert!(text.contains("Distinct days: 2"));
    }
}
