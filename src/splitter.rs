//! Train/validation splitting
//!
//! Rows are assigned in arrival order: the first `train_count` rows train the
//! model and the tail of the stream validates it. The normalization
//! accumulator sees exactly the training rows.

use crate::error::RiskModelError;
use crate::normalizer::OnlineStatisticsAccumulator;
use crate::types::{LabeledRow, NormalizationParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How many rows go to each buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub total: usize,
    pub train_count: usize,
    pub validation_count: usize,
    /// Every row is used for both training and validation
    pub clone_mode: bool,
}

impl SplitPlan {
    /// Plan a split of `total` rows with the requested validation fraction.
    ///
    /// Falls back to clone mode when the split leaves no training rows or no
    /// validation rows.
    pub fn new(total: usize, validation_split: f64) -> Self {
        let requested = (total as f64 * validation_split).round();
        let upper = total.saturating_sub(1) as f64;
        let validation_count = requested.clamp(0.0, upper) as usize;
        let train_count = total - validation_count;

        if train_count < 1 || validation_count == 0 {
            return Self {
                total,
                train_count: total,
                validation_count: 0,
                clone_mode: true,
            };
        }

        Self {
            total,
            train_count,
            validation_count,
            clone_mode: false,
        }
    }
}

/// Result of a split: both buffers plus training-set normalization
#[derive(Debug, Clone)]
pub struct TrainValidationSplit {
    pub plan: SplitPlan,
    pub training: Vec<LabeledRow>,
    pub validation: Vec<LabeledRow>,
    pub normalization: NormalizationParams,
}

/// Single-pass splitter
pub struct TrainValidationSplitter;

impl TrainValidationSplitter {
    /// Split labelled rows and accumulate normalization statistics over the
    /// training buffer.
    pub fn split(
        rows: Vec<LabeledRow>,
        validation_split: f64,
        dimension: usize,
    ) -> Result<TrainValidationSplit, RiskModelError> {
        let plan = SplitPlan::new(rows.len(), validation_split);
        debug!(
            total = plan.total,
            train = plan.train_count,
            validation = plan.validation_count,
            clone_mode = plan.clone_mode,
            "split planned"
        );

        let mut accumulator = OnlineStatisticsAccumulator::new(dimension);
        let mut training = Vec::with_capacity(plan.train_count);
        let mut validation = Vec::with_capacity(if plan.clone_mode {
            plan.total
        } else {
            plan.validation_count
        });

        for (position, row) in rows.into_iter().enumerate() {
            if plan.clone_mode {
                accumulator.push(&row.features)?;
                validation.push(row.clone());
                training.push(row);
            } else if position < plan.train_count {
                accumulator.push(&row.features)?;
                training.push(row);
            } else {
                if row.features.len() != dimension {
                    return Err(RiskModelError::dimension_mismatch(
                        "validation row",
                        dimension,
                        row.features.len(),
                    ));
                }
                validation.push(row);
            }
        }

        Ok(TrainValidationSplit {
            plan,
            training,
            validation,
            normalization: accumulator.finish(),
        })
    }
}
