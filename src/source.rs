//! Restartable CSV row sources
//!
//! Training reads its input twice (statistics pass, then encode/split pass),
//! so a source must be able to start a fresh pass on demand. [`RowSource`]
//! makes that contract explicit: every call to [`RowSource::records`] opens a
//! new reader positioned at the header row. Readers own their file handle and
//! release it when the stream is dropped, whichever way the pass ends.

use crate::columns::{ColumnIndexes, HeaderIndex, LogicalColumnMap};
use crate::error::RiskModelError;
use crate::types::IncidentRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ByteRecord, ReaderBuilder};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A single pass over raw CSV records, header row first.
///
/// Records stay as bytes so a badly encoded cell only affects that cell.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<ByteRecord, RiskModelError>> + 'a>;

/// A CSV source that can be read from the start any number of times
pub trait RowSource {
    /// Start a fresh pass over the source
    fn records(&self) -> Result<RecordStream<'_>, RiskModelError>;

    /// Human-readable description for logs and error messages
    fn describe(&self) -> String;
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

/// CSV file on disk, reopened for every pass
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for CsvFileSource {
    fn records(&self) -> Result<RecordStream<'_>, RiskModelError> {
        let file = File::open(&self.path)?;
        let reader = reader_builder().from_reader(file);
        Ok(Box::new(
            reader
                .into_byte_records()
                .map(|r| r.map_err(RiskModelError::from)),
        ))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// CSV text held in memory
#[derive(Debug, Clone)]
pub struct CsvTextSource {
    text: String,
}

impl CsvTextSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl RowSource for CsvTextSource {
    fn records(&self) -> Result<RecordStream<'_>, RiskModelError> {
        let reader = reader_builder().from_reader(self.text.as_bytes());
        Ok(Box::new(
            reader
                .into_byte_records()
                .map(|r| r.map_err(RiskModelError::from)),
        ))
    }

    fn describe(&self) -> String {
        format!("<in-memory csv, {} bytes>", self.text.len())
    }
}

/// Streaming iterator of parsed incident records.
///
/// Rows whose timestamp cannot be parsed are skipped and counted.
pub struct IncidentStream<'a> {
    records: RecordStream<'a>,
    header: HeaderIndex,
    indexes: ColumnIndexes,
    skipped: u64,
}

impl<'a> IncidentStream<'a> {
    /// Open a pass over `source`, reading the header and locating columns
    /// before any data row is touched.
    pub fn open(
        source: &'a dyn RowSource,
        columns: &LogicalColumnMap,
    ) -> Result<Self, RiskModelError> {
        let mut records = source.records()?;
        let header_record = match records.next() {
            Some(record) => record?,
            None => {
                return Err(RiskModelError::EmptyDataset(format!(
                    "{} has no header row",
                    source.describe()
                )))
            }
        };

        let header_cells: Vec<Cow<'_, str>> =
            header_record.iter().map(String::from_utf8_lossy).collect();
        let header = HeaderIndex::from_headers(header_cells.iter().map(|c| c.as_ref()));
        let indexes = ColumnIndexes::locate(columns, &header)?;

        Ok(Self {
            records,
            header,
            indexes,
            skipped: 0,
        })
    }

    pub fn header(&self) -> &HeaderIndex {
        &self.header
    }

    pub fn indexes(&self) -> ColumnIndexes {
        self.indexes
    }

    /// Rows skipped so far in this pass
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Iterator for IncidentStream<'_> {
    type Item = Result<IncidentRecord, RiskModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            match parse_record(&record, &self.indexes) {
                Some(incident) => return Some(Ok(incident)),
                None => self.skipped += 1,
            }
        }
    }
}

/// Parse one data row; `None` when the timestamp is unusable.
///
/// Cells are decoded lossily: invalid UTF-8 becomes U+FFFD.
pub fn parse_record(record: &ByteRecord, indexes: &ColumnIndexes) -> Option<IncidentRecord> {
    let cell = |idx: usize| {
        record
            .get(idx)
            .map(String::from_utf8_lossy)
            .unwrap_or(Cow::Borrowed(""))
    };
    let optional_cell =
        |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(String::from_utf8_lossy);

    let observed_at = parse_timestamp(&cell(indexes.timestamp))?;
    let category = cell(indexes.category);
    let category = category.trim();

    Some(IncidentRecord {
        observed_at,
        latitude: parse_number(&cell(indexes.latitude)).unwrap_or(0.0),
        longitude: parse_number(&cell(indexes.longitude)).unwrap_or(0.0),
        category: (!category.is_empty()).then(|| category.to_string()),
        risk: optional_cell(indexes.risk).and_then(|c| parse_number(&c)),
        label: optional_cell(indexes.label).and_then(|c| parse_label(&c)),
    })
}

/// Parse a finite number, ignoring surrounding whitespace
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a label cell into 0/1.
///
/// Numbers round to the nearest integer (anything >= 1 is positive);
/// `true`/`yes` and `false`/`no` are accepted as well.
pub fn parse_label(raw: &str) -> Option<u8> {
    if let Some(value) = parse_number(raw) {
        return Some(if value.round() >= 1.0 { 1 } else { 0 });
    }
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" => Some(1),
        "false" | "no" | "n" => Some(0),
        _ => None,
    }
}

const NAIVE_DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a timestamp cell as UTC.
///
/// Accepts RFC 3339, common naive date-time and date layouts, and integer
/// epoch seconds (up to 10 digits) or milliseconds (13 digits).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let value: i64 = trimmed.parse().ok()?;
        return match trimmed.len() {
            0..=10 => DateTime::from_timestamp(value, 0),
            13 => DateTime::from_timestamp_millis(value),
            _ => None,
        };
    }

    None
}
