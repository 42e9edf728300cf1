//! Training configuration
//!
//! Every field is optional in the JSON document; missing values take the
//! documented defaults and hyperparameters are always clamped before use.

use crate::columns::{ColumnResolver, LogicalColumnMap};
use crate::encoder::DEFAULT_MAX_CATEGORIES;
use crate::error::RiskModelError;
use crate::types::{
    Hyperparameters, DEFAULT_ITERATIONS, DEFAULT_LEARNING_RATE, DEFAULT_VALIDATION_SPLIT,
    ITERATIONS_RANGE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default directory artifacts are written below
pub const DEFAULT_ARTIFACT_DIR: &str = "./models";

/// Default model identifier
pub const DEFAULT_MODEL_ID: &str = "incident-risk";

/// Caller-supplied hyperparameters, any of which may be omitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    /// Signed so that negative inputs clamp rather than fail to parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_split: Option<f64>,
}

impl HyperparameterInput {
    /// Fill in defaults and clamp every value into range
    pub fn resolve(&self) -> Hyperparameters {
        let iterations = self
            .iterations
            .map(|n| n.clamp(i64::from(ITERATIONS_RANGE.0), i64::from(ITERATIONS_RANGE.1)) as u32)
            .unwrap_or(DEFAULT_ITERATIONS);

        Hyperparameters {
            learning_rate: self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE),
            iterations,
            validation_split: self.validation_split.unwrap_or(DEFAULT_VALIDATION_SPLIT),
        }
        .clamped()
    }

    /// Values present in `other` replace ours
    pub fn merged_with(self, other: HyperparameterInput) -> Self {
        Self {
            learning_rate: other.learning_rate.or(self.learning_rate),
            iterations: other.iterations.or(self.iterations),
            validation_split: other.validation_split.or(self.validation_split),
        }
    }
}

/// Configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Logical column name → CSV header overrides
    pub columns: HashMap<String, String>,
    pub hyperparameters: HyperparameterInput,
    pub artifact_dir: PathBuf,
    pub model_id: String,
    /// Upper bound on one-hot category slots
    pub max_categories: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            columns: HashMap::new(),
            hyperparameters: HyperparameterInput::default(),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            model_id: DEFAULT_MODEL_ID.to_string(),
            max_categories: DEFAULT_MAX_CATEGORIES,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, RiskModelError> {
        let config: TrainingConfig =
            serde_json::from_str(json).map_err(|e| RiskModelError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self, RiskModelError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Map one logical column to a physical header
    pub fn with_column(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.columns.insert(logical.into(), physical.into());
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: HyperparameterInput) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_artifact_dir(mut self, artifact_dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = artifact_dir.into();
        self
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_categories(mut self, max_categories: usize) -> Self {
        self.max_categories = max_categories;
        self
    }

    /// Resolved, clamped hyperparameters
    pub fn resolved_hyperparameters(&self) -> Hyperparameters {
        self.hyperparameters.resolve()
    }

    /// Resolved column mapping
    pub fn column_map(&self) -> Result<LogicalColumnMap, RiskModelError> {
        ColumnResolver::resolve_named(&self.columns)
    }

    /// Reject values that cannot produce a usable run
    pub fn validate(&self) -> Result<(), RiskModelError> {
        if self.max_categories == 0 {
            return Err(RiskModelError::InvalidConfig(
                "max_categories must be at least 1".to_string(),
            ));
        }
        if self.model_id.trim().is_empty() {
            return Err(RiskModelError::InvalidConfig(
                "model_id must not be empty".to_string(),
            ));
        }
        if self.model_id.contains(['/', '\\']) || self.model_id == ".." {
            return Err(RiskModelError::InvalidConfig(format!(
                "model_id '{}' must not contain path separators",
                self.model_id
            )));
        }
        self.column_map()?;
        Ok(())
    }
}
