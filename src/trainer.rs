//! Logistic regression training
//!
//! Gradient descent over the training buffer, one pass per iteration. Each
//! row's step is applied immediately and scaled by `1 / sample_count`; this
//! exact rule determines the trained weights, so it must not be replaced by a
//! batch-averaged update.

use crate::error::RiskModelError;
use crate::types::{Hyperparameters, LabeledRow, NormalizationParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sigmoid input magnitude beyond which the output saturates
pub const SIGMOID_CLAMP: f64 = 60.0;

/// Probability at or above which a row is predicted positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Logistic function saturating to exactly 0.0 / 1.0 outside ±60
pub fn sigmoid(z: f64) -> f64 {
    if z >= SIGMOID_CLAMP {
        1.0
    } else if z <= -SIGMOID_CLAMP {
        0.0
    } else {
        1.0 / (1.0 + (-z).exp())
    }
}

/// Trained weights (bias first) with the normalization they expect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub normalization: NormalizationParams,
}

impl LogisticModel {
    /// Build a model after checking that every vector agrees on dimension
    pub fn new(weights: Vec<f64>, normalization: NormalizationParams) -> Result<Self, RiskModelError> {
        let dimension = normalization.dimension();
        normalization.validate(dimension)?;
        if weights.len() != dimension + 1 {
            return Err(RiskModelError::dimension_mismatch(
                "weights",
                dimension + 1,
                weights.len(),
            ));
        }
        Ok(Self {
            weights,
            normalization,
        })
    }

    /// Number of input features (excluding the bias)
    pub fn dimension(&self) -> usize {
        self.normalization.dimension()
    }

    /// Positive-class probability for raw (unstandardized) features
    pub fn probability(&self, features: &[f64]) -> Result<f64, RiskModelError> {
        let standardized = self.normalization.standardize(features)?;
        Ok(sigmoid(linear_score(&self.weights, &standardized)))
    }

    /// Predicted label for raw features
    pub fn predict(&self, features: &[f64]) -> Result<u8, RiskModelError> {
        Ok(u8::from(self.probability(features)? >= DECISION_THRESHOLD))
    }
}

/// `w0 + Σ w[i+1] * x[i]` over standardized features
fn linear_score(weights: &[f64], standardized: &[f64]) -> f64 {
    let bias = weights.first().copied().unwrap_or(0.0);
    weights
        .iter()
        .skip(1)
        .zip(standardized)
        .fold(bias, |acc, (w, x)| acc + w * x)
}

/// Gradient-descent trainer
pub struct LogisticRegressionTrainer {
    hyperparameters: Hyperparameters,
}

impl LogisticRegressionTrainer {
    /// Create a trainer; hyperparameters are clamped into range
    pub fn new(hyperparameters: Hyperparameters) -> Self {
        Self {
            hyperparameters: hyperparameters.clamped(),
        }
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Fit weights over `rows`, standardized with `normalization`
    pub fn fit(
        &self,
        rows: &[LabeledRow],
        normalization: &NormalizationParams,
    ) -> Result<LogisticModel, RiskModelError> {
        if rows.is_empty() {
            return Err(RiskModelError::EmptyDataset(
                "no training rows".to_string(),
            ));
        }

        let dimension = normalization.dimension();
        normalization.validate(dimension)?;

        // Reject ragged rows before any weight moves
        for row in rows {
            normalization.validate(row.features.len())?;
        }

        let mut weights = vec![0.0; dimension + 1];
        let step = self.hyperparameters.learning_rate / rows.len() as f64;

        // Bias input first, then the row's standardized features
        let mut input = vec![1.0; dimension + 1];

        for _ in 0..self.hyperparameters.iterations {
            for row in rows {
                normalization.standardize_into(&row.features, &mut input[1..])?;
                let z = weights
                    .iter()
                    .zip(&input)
                    .fold(0.0, |acc, (w, x)| acc + w * x);
                let error = sigmoid(z) - f64::from(row.label);
                for (weight, x) in weights.iter_mut().zip(&input) {
                    *weight -= step * error * x;
                }
            }
        }

        debug!(
            rows = rows.len(),
            iterations = self.hyperparameters.iterations,
            learning_rate = self.hyperparameters.learning_rate,
            "logistic regression fitted"
        );

        LogisticModel::new(weights, normalization.clone())
    }
}
