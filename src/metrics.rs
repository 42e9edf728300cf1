//! Binary classification metrics

use crate::types::Metrics;
use serde::{Deserialize, Serialize};

/// Round to 4 decimal places
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Confusion matrix for a binary classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one prediction against its actual label
    pub fn record(&mut self, predicted: u8, actual: u8) {
        match (predicted != 0, actual != 0) {
            (true, true) => self.true_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_positives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Accuracy, precision, recall and F1, each rounded to 4 decimals.
    ///
    /// Ratios with a zero denominator are reported as 0.
    pub fn metrics(&self) -> Metrics {
        let tp = self.true_positives as f64;
        let accuracy = (tp + self.true_negatives as f64) / self.total().max(1) as f64;
        let precision = ratio(tp, tp + self.false_positives as f64);
        let recall = ratio(tp, tp + self.false_negatives as f64);
        let f1 = ratio(2.0 * precision * recall, precision + recall);

        Metrics {
            accuracy: round4(accuracy),
            precision: round4(precision),
            recall: round4(recall),
            f1: round4(f1),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
