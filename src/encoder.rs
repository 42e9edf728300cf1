//! Feature encoding
//!
//! Turns an incident record and its risk score into a fixed-length vector:
//! cyclical time features, raw coordinates, the risk score and a one-hot
//! block over the category vocabulary.

use crate::types::{DatasetStatistics, FeatureVector, IncidentRecord};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Names of the fixed leading features, in vector order
pub const BASE_FEATURE_NAMES: [&str; 5] = [
    "hour_of_day",
    "day_of_week",
    "latitude",
    "longitude",
    "risk_score",
];

/// Number of fixed leading features
pub const BASE_FEATURE_COUNT: usize = BASE_FEATURE_NAMES.len();

/// Index of the risk score within a feature vector
pub const RISK_FEATURE_INDEX: usize = 4;

/// Default upper bound on one-hot category slots
pub const DEFAULT_MAX_CATEGORIES: usize = 64;

/// Sorted category vocabulary for one training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub categories: Vec<String>,
    /// True when less frequent categories were left out
    pub overflowed: bool,
}

impl CategoryVocabulary {
    /// Build the vocabulary from analysis output.
    ///
    /// Keeps at most `max_categories` values, preferring the most frequent
    /// (ties broken by name), and returns them sorted by name.
    pub fn from_statistics(statistics: &DatasetStatistics, max_categories: usize) -> Self {
        let limit = max_categories.max(1);
        let counts = &statistics.category_counts;

        if counts.len() <= limit {
            return Self {
                categories: counts.keys().cloned().collect(),
                overflowed: false,
            };
        }

        let mut ranked: Vec<(&String, u64)> = counts.iter().map(|(k, v)| (k, *v)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(limit);

        let mut categories: Vec<String> = ranked.into_iter().map(|(k, _)| k.clone()).collect();
        categories.sort();

        Self {
            categories,
            overflowed: true,
        }
    }
}

/// Encoder for one category vocabulary
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    categories: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureEncoder {
    /// Create an encoder whose one-hot block follows `categories` in order
    pub fn new(categories: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(categories.len());
        for (idx, category) in categories.iter().enumerate() {
            positions.entry(category.clone()).or_insert(idx);
        }
        Self {
            categories: categories.to_vec(),
            positions,
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Length of every vector this encoder produces
    pub fn dimension(&self) -> usize {
        BASE_FEATURE_COUNT + self.categories.len()
    }

    /// Feature names mirroring the vector layout
    pub fn feature_names(&self) -> Vec<String> {
        BASE_FEATURE_NAMES
            .iter()
            .map(|name| name.to_string())
            .chain(self.categories.iter().map(|c| format!("category_{c}")))
            .collect()
    }

    /// Encode one record.
    ///
    /// Unknown or empty categories leave the one-hot block all zero.
    pub fn encode(&self, record: &IncidentRecord, risk_score: f64) -> FeatureVector {
        let mut features = Vec::with_capacity(self.dimension());

        let at = record.observed_at;
        features.push(at.hour() as f64 / 23.0);
        features.push((at.weekday().number_from_monday() as f64 - 1.0) / 6.0);
        features.push(record.latitude);
        features.push(record.longitude);
        features.push(risk_score);

        features.resize(self.dimension(), 0.0);
        if let Some(&idx) = record
            .category
            .as_ref()
            .and_then(|category| self.positions.get(category))
        {
            features[BASE_FEATURE_COUNT + idx] = 1.0;
        }

        features
    }
}
