//! Streaming corpus analysis
//!
//! One forward pass over the source computes the statistics every later stage
//! needs before it can transform a row: category frequencies, the observed
//! time range and whether the risk column carries numeric values.

use crate::columns::LogicalColumnMap;
use crate::error::RiskModelError;
use crate::source::{IncidentStream, RowSource};
use crate::types::{DatasetStatistics, IncidentRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// Bucket inserted when no row carries a category value
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Single-pass analyzer over a [`RowSource`]
pub struct StreamingCsvAnalyzer;

impl StreamingCsvAnalyzer {
    /// Analyze the whole source.
    ///
    /// Fails with [`RiskModelError::MissingColumn`] before reading any data
    /// row when a required column has no matching header.
    pub fn analyze(
        source: &dyn RowSource,
        columns: &LogicalColumnMap,
    ) -> Result<DatasetStatistics, RiskModelError> {
        let mut stream = IncidentStream::open(source, columns)?;
        let mut accumulator = StatisticsAccumulator::default();

        for record in stream.by_ref() {
            accumulator.add(&record?);
        }

        let statistics = accumulator.finish(stream.skipped());
        debug!(
            source = %source.describe(),
            rows = statistics.row_count,
            skipped = statistics.skipped_rows,
            categories = statistics.category_counts.len(),
            has_numeric_risk = statistics.has_numeric_risk,
            "dataset analysed"
        );
        Ok(statistics)
    }
}

/// Running state of the analysis pass
#[derive(Debug, Default)]
struct StatisticsAccumulator {
    category_counts: BTreeMap<String, u64>,
    min_time: Option<i64>,
    max_time: Option<i64>,
    has_numeric_risk: bool,
    row_count: u64,
}

impl StatisticsAccumulator {
    fn add(&mut self, record: &IncidentRecord) {
        self.row_count += 1;

        if let Some(category) = &record.category {
            *self.category_counts.entry(category.clone()).or_insert(0) += 1;
        }

        let ts = record.observed_at.timestamp();
        self.min_time = Some(self.min_time.map_or(ts, |m| m.min(ts)));
        self.max_time = Some(self.max_time.map_or(ts, |m| m.max(ts)));

        if !self.has_numeric_risk && record.risk.is_some() {
            self.has_numeric_risk = true;
        }
    }

    fn finish(mut self, skipped_rows: u64) -> DatasetStatistics {
        if self.category_counts.is_empty() {
            self.category_counts
                .insert(DEFAULT_CATEGORY.to_string(), self.row_count);
        }

        let min_count = self.category_counts.values().copied().min().unwrap_or(0);
        let max_count = self.category_counts.values().copied().max().unwrap_or(0);

        let time_span = match (self.min_time, self.max_time) {
            (Some(min), Some(max)) => Some((max - min).max(0)),
            _ => None,
        };

        DatasetStatistics {
            category_counts: self.category_counts,
            min_count,
            max_count,
            min_time: self.min_time,
            max_time: self.max_time,
            time_span,
            has_numeric_risk: self.has_numeric_risk,
            row_count: self.row_count,
            skipped_rows,
        }
    }
}
