//! Feature normalization
//!
//! Incremental per-dimension mean/variance (Welford's algorithm) so training
//! features can be standardized without holding the dataset twice, plus the
//! standardize/de-standardize operations over the resulting parameters.

use crate::error::RiskModelError;
use crate::types::NormalizationParams;

/// Std-dev used for dimensions whose accumulated variance is not positive
pub const STD_DEV_FLOOR: f64 = 1.0;

/// Streaming mean/variance accumulator over fixed-length vectors
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineStatisticsAccumulator {
    count: u64,
    means: Vec<f64>,
    m2: Vec<f64>,
}

impl OnlineStatisticsAccumulator {
    /// Create an accumulator for vectors of length `dimension`
    pub fn new(dimension: usize) -> Self {
        Self {
            count: 0,
            means: vec![0.0; dimension],
            m2: vec![0.0; dimension],
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    /// Fold one vector into the running statistics
    pub fn push(&mut self, features: &[f64]) -> Result<(), RiskModelError> {
        if features.len() != self.means.len() {
            return Err(RiskModelError::dimension_mismatch(
                "normalization accumulator",
                self.means.len(),
                features.len(),
            ));
        }

        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.means.iter_mut().zip(self.m2.iter_mut()).zip(features) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
        Ok(())
    }

    /// Population std-dev per dimension, floored to [`STD_DEV_FLOOR`]
    pub fn finish(&self) -> NormalizationParams {
        let std_devs = self
            .m2
            .iter()
            .map(|&m2| {
                let std_dev = if self.count > 0 {
                    (m2 / self.count as f64).sqrt()
                } else {
                    0.0
                };
                floor_std_dev(std_dev)
            })
            .collect();

        NormalizationParams {
            means: self.means.clone(),
            std_devs,
        }
    }
}

fn floor_std_dev(std_dev: f64) -> f64 {
    if std_dev.is_finite() && std_dev > 0.0 {
        std_dev
    } else {
        STD_DEV_FLOOR
    }
}

impl NormalizationParams {
    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    /// Check that means and std-devs agree with each other and with
    /// `expected` feature dimensions
    pub fn validate(&self, expected: usize) -> Result<(), RiskModelError> {
        if self.means.len() != expected {
            return Err(RiskModelError::dimension_mismatch(
                "feature means",
                expected,
                self.means.len(),
            ));
        }
        if self.std_devs.len() != expected {
            return Err(RiskModelError::dimension_mismatch(
                "feature std-devs",
                expected,
                self.std_devs.len(),
            ));
        }
        Ok(())
    }

    /// `(x - mean) / std_dev` for every dimension
    pub fn standardize(&self, features: &[f64]) -> Result<Vec<f64>, RiskModelError> {
        let mut out = vec![0.0; features.len()];
        self.standardize_into(features, &mut out)?;
        Ok(out)
    }

    /// Standardize `features` into a caller-owned buffer of the same length
    pub fn standardize_into(&self, features: &[f64], out: &mut [f64]) -> Result<(), RiskModelError> {
        self.validate(features.len())?;
        if out.len() != features.len() {
            return Err(RiskModelError::dimension_mismatch(
                "standardized buffer",
                features.len(),
                out.len(),
            ));
        }
        for (((slot, &x), &mean), &std_dev) in out
            .iter_mut()
            .zip(features)
            .zip(&self.means)
            .zip(&self.std_devs)
        {
            *slot = (x - mean) / floor_std_dev(std_dev);
        }
        Ok(())
    }

    /// Inverse of [`NormalizationParams::standardize`]
    pub fn destandardize(&self, standardized: &[f64]) -> Result<Vec<f64>, RiskModelError> {
        self.validate(standardized.len())?;
        Ok(standardized
            .iter()
            .zip(&self.means)
            .zip(&self.std_devs)
            .map(|((&z, &mean), &std_dev)| z * floor_std_dev(std_dev) + mean)
            .collect())
    }
}
