//! Scoring a trained model against labelled rows
//!
//! Used for the validation pass at the end of training and for standalone
//! evaluation of a persisted artifact.

use crate::error::RiskModelError;
use crate::metrics::ConfusionMatrix;
use crate::trainer::LogisticModel;
use crate::types::{LabeledRow, Metrics};
use tracing::debug;

/// Applies a model to rows and accumulates a confusion matrix
pub struct EvaluationScorer;

impl EvaluationScorer {
    /// Confusion matrix of `model` predictions against the row labels
    pub fn confusion_matrix(
        model: &LogisticModel,
        rows: &[LabeledRow],
    ) -> Result<ConfusionMatrix, RiskModelError> {
        let mut matrix = ConfusionMatrix::new();
        for row in rows {
            let predicted = model.predict(&row.features)?;
            matrix.record(predicted, row.label);
        }
        Ok(matrix)
    }

    /// Rounded metrics of `model` over `rows`
    pub fn score(model: &LogisticModel, rows: &[LabeledRow]) -> Result<Metrics, RiskModelError> {
        let matrix = Self::confusion_matrix(model, rows)?;
        let metrics = matrix.metrics();
        debug!(
            rows = rows.len(),
            tp = matrix.true_positives,
            tn = matrix.true_negatives,
            fp = matrix.false_positives,
            fn_ = matrix.false_negatives,
            accuracy = metrics.accuracy,
            "rows scored"
        );
        Ok(metrics)
    }
}
