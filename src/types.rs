//! Core types for the incident risk pipeline
//!
//! This module defines the values that flow through each stage of the
//! pipeline: parsed incident records, corpus statistics, scored and labelled
//! rows, normalization parameters, hyperparameters and metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered feature values for one row.
///
/// Layout: `hour_of_day, day_of_week, latitude, longitude, risk_score`
/// followed by one one-hot slot per vocabulary category.
pub type FeatureVector = Vec<f64>;

/// Semantic fields the pipeline reads from a CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalColumn {
    Timestamp,
    Latitude,
    Longitude,
    Category,
    Risk,
    Label,
}

impl LogicalColumn {
    /// All logical columns in resolution order
    pub const ALL: [LogicalColumn; 6] = [
        LogicalColumn::Timestamp,
        LogicalColumn::Latitude,
        LogicalColumn::Longitude,
        LogicalColumn::Category,
        LogicalColumn::Risk,
        LogicalColumn::Label,
    ];

    /// Columns that must be present in every input file
    pub const REQUIRED: [LogicalColumn; 4] = [
        LogicalColumn::Timestamp,
        LogicalColumn::Latitude,
        LogicalColumn::Longitude,
        LogicalColumn::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalColumn::Timestamp => "timestamp",
            LogicalColumn::Latitude => "latitude",
            LogicalColumn::Longitude => "longitude",
            LogicalColumn::Category => "category",
            LogicalColumn::Risk => "risk",
            LogicalColumn::Label => "label",
        }
    }

    /// Parse a logical column name (as used in configuration files and CLI flags)
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = crate::columns::normalize_column_name(name)?;
        match normalized.as_str() {
            "timestamp" => Some(LogicalColumn::Timestamp),
            "latitude" => Some(LogicalColumn::Latitude),
            "longitude" => Some(LogicalColumn::Longitude),
            "category" => Some(LogicalColumn::Category),
            "risk" => Some(LogicalColumn::Risk),
            "label" => Some(LogicalColumn::Label),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data row after ingestion.
///
/// Optional columns are resolved here, once: `risk` and `label` are `None`
/// when the column is absent or the cell is not numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// When the incident was observed (UTC)
    pub observed_at: DateTime<Utc>,
    /// Latitude (0.0 when the cell is not numeric)
    pub latitude: f64,
    /// Longitude (0.0 when the cell is not numeric)
    pub longitude: f64,
    /// Trimmed category value, `None` when empty
    pub category: Option<String>,
    /// Supplied risk value, unclamped
    pub risk: Option<f64>,
    /// Supplied label, already rounded to 0/1
    pub label: Option<u8>,
}

/// Corpus-level statistics from a single streaming pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    /// Occurrences per category value
    pub category_counts: BTreeMap<String, u64>,
    /// Smallest category count
    pub min_count: u64,
    /// Largest category count
    pub max_count: u64,
    /// Earliest observation (epoch seconds)
    pub min_time: Option<i64>,
    /// Latest observation (epoch seconds)
    pub max_time: Option<i64>,
    /// `max_time - min_time`, never negative
    pub time_span: Option<i64>,
    /// Whether the risk column carried at least one numeric value
    pub has_numeric_risk: bool,
    /// Rows with a parseable timestamp
    pub row_count: u64,
    /// Rows dropped because the timestamp could not be parsed
    pub skipped_rows: u64,
}

impl DatasetStatistics {
    /// Count for a category, if it was observed
    pub fn category_count(&self, category: &str) -> Option<u64> {
        self.category_counts.get(category).copied()
    }
}

/// A row with its risk score computed but its label not yet resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    /// Encoded features (risk score included)
    pub features: FeatureVector,
    /// Risk score in [0, 1]
    pub risk: f64,
    /// Label supplied by the source, if any
    pub provided_label: Option<u8>,
    /// Observation time (epoch seconds)
    pub timestamp: i64,
}

/// A fully resolved training/evaluation example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub features: FeatureVector,
    /// Always 0 or 1
    pub label: u8,
    /// Observation time (epoch seconds)
    pub timestamp: i64,
}

/// Per-dimension standardization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    pub means: Vec<f64>,
    pub std_devs: Vec<f64>,
}

/// Learning rate bounds and default
pub const LEARNING_RATE_RANGE: (f64, f64) = (0.0001, 1.0);
pub const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// Iteration bounds and default
pub const ITERATIONS_RANGE: (u32, u32) = (100, 5000);
pub const DEFAULT_ITERATIONS: u32 = 600;

/// Validation split bounds and default
pub const VALIDATION_SPLIT_RANGE: (f64, f64) = (0.1, 0.5);
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

/// Resolved, range-clamped training hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub iterations: u32,
    pub validation_split: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            iterations: DEFAULT_ITERATIONS,
            validation_split: DEFAULT_VALIDATION_SPLIT,
        }
    }
}

impl Hyperparameters {
    /// Clamp every field into its allowed range.
    ///
    /// Non-finite floats fall back to their defaults before clamping.
    pub fn clamped(self) -> Self {
        let learning_rate = if self.learning_rate.is_finite() {
            self.learning_rate
        } else {
            DEFAULT_LEARNING_RATE
        };
        let validation_split = if self.validation_split.is_finite() {
            self.validation_split
        } else {
            DEFAULT_VALIDATION_SPLIT
        };

        Self {
            learning_rate: learning_rate.clamp(LEARNING_RATE_RANGE.0, LEARNING_RATE_RANGE.1),
            iterations: self.iterations.clamp(ITERATIONS_RANGE.0, ITERATIONS_RANGE.1),
            validation_split: validation_split
                .clamp(VALIDATION_SPLIT_RANGE.0, VALIDATION_SPLIT_RANGE.1),
        }
    }
}

/// Binary classification metrics, each in [0, 1] and rounded to 4 decimals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyperparameters_clamp_out_of_range() {
        let clamped = Hyperparameters {
            learning_rate: 5.0,
            iterations: 10,
            validation_split: 0.9,
        }
        .clamped();

        assert_eq!(clamped.learning_rate, 1.0);
        assert_eq!(clamped.iterations, 100);
        assert_eq!(clamped.validation_split, 0.5);

        let clamped = Hyperparameters {
            learning_rate: 0.0,
            iterations: 1_000_000,
            validation_split: 0.0,
        }
        .clamped();

        assert_eq!(clamped.learning_rate, 0.0001);
        assert_eq!(clamped.iterations, 5000);
        assert_eq!(clamped.validation_split, 0.1);
    }

    #[test]
    fn test_hyperparameters_non_finite_use_defaults() {
        let clamped = Hyperparameters {
            learning_rate: f64::NAN,
            iterations: 600,
            validation_split: f64::INFINITY,
        }
        .clamped();

        assert_eq!(clamped, Hyperparameters::default());
    }

    #[test]
    fn test_logical_column_parse() {
        assert_eq!(LogicalColumn::parse("Latitude"), Some(LogicalColumn::Latitude));
        assert_eq!(LogicalColumn::parse(" risk "), Some(LogicalColumn::Risk));
        assert_eq!(LogicalColumn::parse("severity"), None);
    }
}
