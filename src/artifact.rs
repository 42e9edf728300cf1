//! Persisted model artifacts
//!
//! A training run produces exactly one artifact: the weights (bias first),
//! the training-set normalization, the category vocabulary the one-hot block
//! was built from, and the run's metadata. Artifacts are plain JSON files and
//! are never rewritten once produced.

use crate::error::RiskModelError;
use crate::trainer::LogisticModel;
use crate::types::{Hyperparameters, Metrics, NormalizationParams};
use crate::{INCIDENT_RISK_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Format of the version token derived from the training completion time
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Fields that must be present and numeric for an artifact to be usable
const NUMERIC_FIELDS: [&str; 3] = ["weights", "feature_means", "feature_std_devs"];

/// Software that produced an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProducer {
    pub name: String,
    pub version: String,
}

impl Default for ArtifactProducer {
    fn default() -> Self {
        Self {
            name: PRODUCER_NAME.to_string(),
            version: INCIDENT_RISK_VERSION.to_string(),
        }
    }
}

/// Serialized output of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub training_run_id: String,
    #[serde(default)]
    pub trained_at: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
    /// Bias first, then one weight per feature
    pub weights: Vec<f64>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_std_devs: Vec<f64>,
    /// Vocabulary the one-hot block was built from, in slot order
    pub categories: Vec<String>,
    #[serde(default)]
    pub category_overflowed: bool,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub producer: ArtifactProducer,
}

/// One feature weight, for interpretability output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Human-oriented overview of an artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSummary {
    pub model_id: String,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub dimension: usize,
    pub category_count: usize,
    pub category_overflowed: bool,
    pub bias: f64,
    pub hyperparameters: Hyperparameters,
    pub metrics: Metrics,
    /// Strongest weights by magnitude, strongest first
    pub top_weights: Vec<FeatureWeight>,
}

/// Version token for a training completion time
pub fn version_token(trained_at: &DateTime<Utc>) -> String {
    trained_at.format(VERSION_FORMAT).to_string()
}

impl ModelArtifact {
    /// Assemble the artifact for a finished training run
    #[allow(clippy::too_many_arguments)]
    pub fn from_training(
        model_id: impl Into<String>,
        training_run_id: impl Into<String>,
        trained_at: DateTime<Utc>,
        model: &LogisticModel,
        feature_names: Vec<String>,
        categories: Vec<String>,
        category_overflowed: bool,
        hyperparameters: Hyperparameters,
        metrics: Metrics,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            training_run_id: training_run_id.into(),
            version: version_token(&trained_at),
            trained_at,
            weights: model.weights.clone(),
            feature_names,
            feature_means: model.normalization.means.clone(),
            feature_std_devs: model.normalization.std_devs.clone(),
            categories,
            category_overflowed,
            hyperparameters,
            metrics,
            producer: ArtifactProducer::default(),
        }
    }

    /// Parse and validate an artifact document.
    ///
    /// Missing or non-numeric `weights`, `feature_means`, `feature_std_devs`
    /// and a missing or non-string `categories` list are reported as
    /// [`RiskModelError::MalformedArtifact`].
    pub fn from_json(json: &str) -> Result<Self, RiskModelError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RiskModelError::MalformedArtifact(format!("invalid JSON: {e}")))?;
        check_required_fields(&value)?;

        let artifact: ModelArtifact = serde_json::from_value(value)
            .map_err(|e| RiskModelError::MalformedArtifact(e.to_string()))?;
        artifact.check_consistency()?;
        Ok(artifact)
    }

    /// Read and validate an artifact file
    pub fn load(path: &Path) -> Result<Self, RiskModelError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, RiskModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Location of this artifact below `artifact_dir`
    pub fn relative_path(&self) -> PathBuf {
        let model_dir = if self.model_id.is_empty() {
            PRODUCER_NAME
        } else {
            self.model_id.as_str()
        };
        Path::new(model_dir).join(format!("{}.json", self.version))
    }

    /// Write to `<artifact_dir>/<model_id>/<version>.json` and return the path.
    ///
    /// Fails with an `AlreadyExists` I/O error when that file is already
    /// present; an existing artifact is left untouched.
    pub fn write_to(&self, artifact_dir: &Path) -> Result<PathBuf, RiskModelError> {
        let path = artifact_dir.join(self.relative_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        info!(
            path = %path.display(),
            model_id = %self.model_id,
            version = %self.version,
            "model artifact written"
        );
        Ok(path)
    }

    /// Number of input features the weights expect
    pub fn dimension(&self) -> usize {
        self.feature_means.len()
    }

    /// Check the artifact against the length of encoded feature vectors
    pub fn validate_dimensions(&self, feature_dimension: usize) -> Result<(), RiskModelError> {
        if self.weights.len() != feature_dimension + 1 {
            return Err(RiskModelError::dimension_mismatch(
                "artifact weights",
                feature_dimension + 1,
                self.weights.len(),
            ));
        }
        self.normalization().validate(feature_dimension)
    }

    pub fn normalization(&self) -> NormalizationParams {
        NormalizationParams {
            means: self.feature_means.clone(),
            std_devs: self.feature_std_devs.clone(),
        }
    }

    /// Rebuild the scoring model
    pub fn model(&self) -> Result<LogisticModel, RiskModelError> {
        LogisticModel::new(self.weights.clone(), self.normalization())
    }

    /// Overview with the `top_n` strongest feature weights
    pub fn summary(&self, top_n: usize) -> ArtifactSummary {
        let mut weights: Vec<FeatureWeight> = self
            .weights
            .iter()
            .skip(1)
            .enumerate()
            .map(|(idx, &weight)| FeatureWeight {
                feature: self.feature_name(idx),
                weight,
            })
            .collect();
        weights.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
        weights.truncate(top_n);

        ArtifactSummary {
            model_id: self.model_id.clone(),
            version: self.version.clone(),
            trained_at: self.trained_at,
            dimension: self.dimension(),
            category_count: self.categories.len(),
            category_overflowed: self.category_overflowed,
            bias: self.weights.first().copied().unwrap_or(0.0),
            hyperparameters: self.hyperparameters,
            metrics: self.metrics,
            top_weights: weights,
        }
    }

    fn feature_name(&self, idx: usize) -> String {
        self.feature_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("feature_{idx}"))
    }

    fn check_consistency(&self) -> Result<(), RiskModelError> {
        let dimension = self.feature_means.len();
        self.validate_dimensions(dimension)
    }
}

fn check_required_fields(value: &Value) -> Result<(), RiskModelError> {
    let object = value
        .as_object()
        .ok_or_else(|| RiskModelError::MalformedArtifact("expected a JSON object".to_string()))?;

    for field in NUMERIC_FIELDS {
        let items = object
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| RiskModelError::MalformedArtifact(format!("'{field}' must be an array")))?;
        if let Some(position) = items.iter().position(|item| !item.is_number()) {
            return Err(RiskModelError::MalformedArtifact(format!(
                "'{field}[{position}]' is not a number"
            )));
        }
    }

    let categories = object
        .get("categories")
        .and_then(Value::as_array)
        .ok_or_else(|| RiskModelError::MalformedArtifact("'categories' must be an array".to_string()))?;
    if categories.iter().any(|item| !item.is_string()) {
        return Err(RiskModelError::MalformedArtifact(
            "'categories' must contain only strings".to_string(),
        ));
    }

    Ok(())
}
