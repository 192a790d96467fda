// src/store.rs
//! CSV files at the process boundary: classified records, raw articles, daily series and forecasts.
//!
//! Readers drop malformed rows and count them; writers go through a temp file and rename so an
//! interrupted run never leaves a half-written artifact behind.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use metrics::counter;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{MalformedRecord, PipelineError};
use crate::types::{derive_id, Article, ArticleRecord, DailyPoint, ForecastPoint, SentimentLabel};

/// Accepted names for the label column, in order of preference.
pub const LABEL_COLUMNS: [&str; 3] = ["sentiment_label", "predicted_sentiment", "sentiment"];

const RECORD_HEADER: [&str; 6] = [
    "id",
    "title",
    "url",
    "publishedAt",
    "sentiment_label",
    "sentiment_score",
];
const ARTICLE_HEADER: [&str; 6] = ["id", "title", "description", "url", "source", "publishedAt"];

/// Parsed rows plus the rows that were rejected.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    pub malformed: Vec<MalformedRecord>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    pub fn malformed_count(&self) -> usize {
        self.malformed.len()
    }
}

/// Parse an ISO-8601-ish timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Column positions resolved from a header row.
struct Columns {
    headers: StringRecord,
}

impl Columns {
    fn new(headers: StringRecord) -> Self {
        Self { headers }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    fn require(&self, name: &'static str, path_hint: &str) -> Result<usize> {
        self.find(name)
            .ok_or_else(|| anyhow!("{path_hint}: missing required column `{name}`"))
    }
}

fn field<'a>(rec: &'a StringRecord, idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| rec.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn open_input(path: &Path) -> Result<fs::File> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        }
        .into());
    }
    fs::File::open(path).with_context(|| format!("opening {}", path.display()))
}

/// Read classified records from any CSV source.
pub fn read_records<R: Read>(input: R, source_hint: &str) -> Result<Loaded<ArticleRecord>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(input);
    let cols = Columns::new(rdr.headers().context("reading header row")?.clone());

    let title_i = cols.require("title", source_hint)?;
    let ts_i = cols.require("publishedAt", source_hint)?;
    let score_i = cols.require("sentiment_score", source_hint)?;
    let label_i = LABEL_COLUMNS
        .iter()
        .find_map(|name| cols.find(name))
        .ok_or_else(|| {
            anyhow!(
                "{source_hint}: missing label column (one of {})",
                LABEL_COLUMNS.join(", ")
            )
        })?;
    let id_i = cols.find("id");
    let url_i = cols.find("url");

    let mut out = Loaded::default();
    let mut seen = HashSet::new();

    for (idx, row) in rdr.records().enumerate() {
        // Header is line 1.
        let row_no = idx + 2;
        let parsed = row
            .map_err(|e| MalformedRecord::Unreadable {
                row: row_no,
                message: e.to_string(),
            })
            .and_then(|rec| {
                parse_record_row(&rec, row_no, title_i, ts_i, score_i, label_i, id_i, url_i)
            })
            .and_then(|rec| {
                if seen.insert(rec.id.clone()) {
                    Ok(rec)
                } else {
                    Err(MalformedRecord::DuplicateId {
                        row: row_no,
                        id: rec.id,
                    })
                }
            });
        match parsed {
            Ok(rec) => out.items.push(rec),
            Err(e) => {
                tracing::debug!(source = source_hint, error = %e, "dropping malformed row");
                out.malformed.push(e);
            }
        }
    }

    counter!("records_loaded_total").increment(out.items.len() as u64);
    counter!("records_malformed_total").increment(out.malformed.len() as u64);
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn parse_record_row(
    rec: &StringRecord,
    row: usize,
    title_i: usize,
    ts_i: usize,
    score_i: usize,
    label_i: usize,
    id_i: Option<usize>,
    url_i: Option<usize>,
) -> Result<ArticleRecord, MalformedRecord> {
    let title = rec.get(title_i).map(str::trim).unwrap_or_default().to_string();

    let ts_raw = field(rec, Some(ts_i)).ok_or(MalformedRecord::MissingField {
        row,
        column: "publishedAt",
    })?;
    let published_at = parse_timestamp(ts_raw).ok_or_else(|| MalformedRecord::BadValue {
        row,
        column: "publishedAt",
        value: ts_raw.to_string(),
    })?;

    let score_raw = field(rec, Some(score_i)).ok_or(MalformedRecord::MissingField {
        row,
        column: "sentiment_score",
    })?;
    let score = score_raw
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && (-1.0..=1.0).contains(s))
        .ok_or_else(|| MalformedRecord::BadValue {
            row,
            column: "sentiment_score",
            value: score_raw.to_string(),
        })?;

    let label_raw = field(rec, Some(label_i)).ok_or(MalformedRecord::MissingField {
        row,
        column: "sentiment_label",
    })?;
    let label = label_raw
        .parse::<SentimentLabel>()
        .map_err(|_| MalformedRecord::BadValue {
            row,
            column: "sentiment_label",
            value: label_raw.to_string(),
        })?;

    let id = field(rec, id_i)
        .map(str::to_string)
        .unwrap_or_else(|| derive_id(&title, &published_at));

    Ok(ArticleRecord {
        id,
        title,
        url: field(rec, url_i).map(str::to_string),
        published_at,
        sentiment_label: label,
        sentiment_score: score,
    })
}

/// Read unclassified articles (output of the fetcher) from any CSV source.
pub fn read_articles<R: Read>(input: R, source_hint: &str) -> Result<Loaded<Article>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(input);
    let cols = Columns::new(rdr.headers().context("reading header row")?.clone());

    let title_i = cols.require("title", source_hint)?;
    let ts_i = cols.require("publishedAt", source_hint)?;
    let id_i = cols.find("id");
    let desc_i = cols.find("description");
    let url_i = cols.find("url");
    let source_i = cols.find("source");

    let mut out = Loaded::default();
    let mut seen = HashSet::new();

    for (idx, row) in rdr.records().enumerate() {
        let row_no = idx + 2;
        let rec = match row {
            Ok(r) => r,
            Err(e) => {
                out.malformed.push(MalformedRecord::Unreadable {
                    row: row_no,
                    message: e.to_string(),
                });
                continue;
            }
        };
        let Some(title) = field(&rec, Some(title_i)) else {
            out.malformed.push(MalformedRecord::MissingField {
                row: row_no,
                column: "title",
            });
            continue;
        };
        let Some(ts_raw) = field(&rec, Some(ts_i)) else {
            out.malformed.push(MalformedRecord::MissingField {
                row: row_no,
                column: "publishedAt",
            });
            continue;
        };
        let Some(published_at) = parse_timestamp(ts_raw) else {
            out.malformed.push(MalformedRecord::BadValue {
                row: row_no,
                column: "publishedAt",
                value: ts_raw.to_string(),
            });
            continue;
        };
        let id = field(&rec, id_i)
            .map(str::to_string)
            .unwrap_or_else(|| derive_id(title, &published_at));
        if !seen.insert(id.clone()) {
            out.malformed.push(MalformedRecord::DuplicateId { row: row_no, id });
            continue;
        }
        out.items.push(Article {
            id,
            title: title.to_string(),
            description: field(&rec, desc_i).map(str::to_string),
            url: field(&rec, url_i).map(str::to_string),
            source: field(&rec, source_i).map(str::to_string),
            published_at,
        });
    }

    counter!("records_malformed_total").increment(out.malformed.len() as u64);
    Ok(out)
}

pub fn load_articles(path: &Path) -> Result<Loaded<Article>> {
    let file = open_input(path)?;
    read_articles(file, &path.display().to_string())
}

/// Append-only store of classified records backed by one CSV file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every well-formed record. A missing file is `MissingInput`.
    pub fn load(&self) -> Result<Loaded<ArticleRecord>> {
        let file = open_input(&self.path)?;
        let loaded = read_records(file, &self.path.display().to_string())?;
        tracing::info!(
            path = %self.path.display(),
            records = loaded.items.len(),
            malformed = loaded.malformed_count(),
            "loaded record store"
        );
        Ok(loaded)
    }

    /// Append records whose id is not stored yet. Returns how many were written.
    ///
    /// A store in the canonical layout is extended in place; stored rows are never touched.
    /// A store with any other header (for example a `predicted_sentiment` export) is
    /// migrated to the canonical layout first, since appended rows must match its columns.
    pub fn append(&self, records: &[ArticleRecord]) -> Result<usize> {
        let layout = StoredLayout::inspect(&self.path)?;
        let prior = match layout {
            StoredLayout::Missing | StoredLayout::Empty => Loaded::default(),
            _ => self.load()?,
        };
        let existing: HashSet<&str> = prior.items.iter().map(|r| r.id.as_str()).collect();
        let fresh: Vec<&ArticleRecord> = records
            .iter()
            .filter(|r| !existing.contains(r.id.as_str()))
            .collect();
        if fresh.is_empty() && !matches!(layout, StoredLayout::Missing) {
            tracing::info!(path = %self.path.display(), skipped = records.len(), "nothing to append");
            return Ok(0);
        }

        let (copy, needs_newline) = match layout {
            StoredLayout::Missing | StoredLayout::Empty => (false, false),
            StoredLayout::Canonical { needs_newline } => (true, needs_newline),
            StoredLayout::Other => {
                if prior.malformed_count() > 0 {
                    tracing::warn!(
                        path = %self.path.display(),
                        dropped = prior.malformed_count(),
                        "malformed rows do not survive migration to the canonical layout"
                    );
                }
                let mut merged = prior.items;
                merged.extend(fresh.iter().map(|r| (*r).clone()));
                write_records(&self.path, &merged)?;
                tracing::info!(
                    path = %self.path.display(),
                    appended = fresh.len(),
                    skipped = records.len() - fresh.len(),
                    "migrated record store to canonical layout and appended"
                );
                return Ok(fresh.len());
            }
        };

        let tmp = tmp_path(&self.path);
        if copy {
            fs::copy(&self.path, &tmp)
                .with_context(|| format!("staging {}", self.path.display()))?;
        } else {
            ensure_parent(&self.path)?;
            fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&tmp)
            .with_context(|| format!("opening {}", tmp.display()))?;
        if needs_newline {
            // Keeps the first new row off the end of the last stored one.
            file.write_all(b"\n")?;
        }
        let mut w = WriterBuilder::new().from_writer(file);
        if !copy {
            w.write_record(RECORD_HEADER)?;
        }
        for r in &fresh {
            w.write_record(record_fields(r))?;
        }
        w.flush()?;
        drop(w);
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("committing {}", self.path.display()))?;

        tracing::info!(
            path = %self.path.display(),
            appended = fresh.len(),
            skipped = records.len() - fresh.len(),
            "appended records"
        );
        Ok(fresh.len())
    }
}

/// What is on disk at a record store path before an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredLayout {
    Missing,
    Empty,
    Canonical { needs_newline: bool },
    Other,
}

impl StoredLayout {
    fn inspect(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::Missing);
        }
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::Empty);
        }
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(bytes.as_slice());
        let headers = rdr.headers().context("reading header row")?;
        if headers.iter().map(str::trim).eq(RECORD_HEADER) {
            Ok(Self::Canonical {
                needs_newline: !bytes.ends_with(b"\n"),
            })
        } else {
            Ok(Self::Other)
        }
    }
}

fn record_fields(r: &ArticleRecord) -> [String; 6] {
    [
        r.id.clone(),
        r.title.clone(),
        r.url.clone().unwrap_or_default(),
        format_timestamp(&r.published_at),
        r.sentiment_label.as_str().to_string(),
        r.sentiment_score.to_string(),
    ]
}

/// Replace a record file wholesale. Used for derived record sets such as synthetic history.
pub fn write_records(path: &Path, records: &[ArticleRecord]) -> Result<()> {
    write_atomically(path, |w| {
        w.write_record(RECORD_HEADER)?;
        for r in records {
            w.write_record(record_fields(r))?;
        }
        Ok(())
    })
}

pub fn write_articles(path: &Path, articles: &[Article]) -> Result<()> {
    write_atomically(path, |w| {
        w.write_record(ARTICLE_HEADER)?;
        for a in articles {
            w.write_record([
                a.id.as_str(),
                a.title.as_str(),
                a.description.as_deref().unwrap_or(""),
                a.url.as_deref().unwrap_or(""),
                a.source.as_deref().unwrap_or(""),
                format_timestamp(&a.published_at).as_str(),
            ])?;
        }
        Ok(())
    })
}

pub fn write_daily(path: &Path, points: &[DailyPoint]) -> Result<()> {
    write_atomically(path, |w| {
        w.write_record(["ds", "y", "article_count"])?;
        for p in points {
            w.write_record([
                p.day.to_string(),
                p.mean_score.to_string(),
                p.article_count.to_string(),
            ])?;
        }
        Ok(())
    })
}

/// Read a daily series written by [`write_daily`].
pub fn load_daily(path: &Path) -> Result<Loaded<DailyPoint>> {
    let file = open_input(path)?;
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(file);
    let hint = path.display().to_string();
    let cols = Columns::new(rdr.headers().context("reading header row")?.clone());
    let ds_i = cols.require("ds", &hint)?;
    let y_i = cols.require("y", &hint)?;
    let n_i = cols.find("article_count");

    let mut out = Loaded::default();
    for (idx, row) in rdr.records().enumerate() {
        let row_no = idx + 2;
        let parsed = row
            .map_err(|e| MalformedRecord::Unreadable {
                row: row_no,
                message: e.to_string(),
            })
            .and_then(|rec| {
                let ds = field(&rec, Some(ds_i)).unwrap_or_default();
                let day = NaiveDate::parse_from_str(ds, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_timestamp(ds).map(|t| t.date_naive()))
                    .ok_or_else(|| MalformedRecord::BadValue {
                        row: row_no,
                        column: "ds",
                        value: ds.to_string(),
                    })?;
                let y_raw = field(&rec, Some(y_i)).unwrap_or_default();
                let mean_score = y_raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| MalformedRecord::BadValue {
                        row: row_no,
                        column: "y",
                        value: y_raw.to_string(),
                    })?;
                let article_count = field(&rec, n_i)
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(1)
                    .max(1);
                Ok(DailyPoint {
                    day,
                    mean_score,
                    article_count,
                })
            });
        match parsed {
            Ok(p) => out.items.push(p),
            Err(e) => out.malformed.push(e),
        }
    }
    Ok(out)
}

pub fn write_forecast(path: &Path, points: &[ForecastPoint]) -> Result<()> {
    write_atomically(path, |w| {
        w.write_record(["ds", "yhat", "yhat_lower", "yhat_upper"])?;
        for p in points {
            w.write_record([
                p.day.to_string(),
                p.predicted.to_string(),
                p.lower_bound.to_string(),
                p.upper_bound.to_string(),
            ])?;
        }
        Ok(())
    })
}

fn write_atomically<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> Result<()>,
{
    ensure_parent(path)?;
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut w = WriterBuilder::new().from_writer(file);
    if let Err(e) = body(&mut w).and_then(|_| w.flush().map_err(anyhow::Error::from)) {
        drop(w);
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    drop(w);
    fs::rename(&tmp, path).with_context(|| format!("committing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "wrote artifact");
    Ok(())
}

/// Delete a derived artifact that the current run could not rebuild. Returns whether a file
/// was removed.
pub fn remove_stale(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "removed stale artifact");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
