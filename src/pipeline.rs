//! Pipeline orchestration
//!
//! This module provides the public API for training and evaluation. It
//! orchestrates the stages from a raw CSV source to a persisted model
//! artifact, and from an artifact plus a fresh dataset to metrics.

use crate::analyzer::StreamingCsvAnalyzer;
use crate::artifact::ModelArtifact;
use crate::columns::{ColumnResolver, LogicalColumnMap};
use crate::config::TrainingConfig;
use crate::encoder::{CategoryVocabulary, FeatureEncoder};
use crate::error::RiskModelError;
use crate::evaluation::EvaluationScorer;
use crate::source::{CsvFileSource, IncidentStream, RowSource};
use crate::splitter::{SplitPlan, TrainValidationSplitter};
use crate::synthesizer::RiskLabelSynthesizer;
use crate::trainer::LogisticRegressionTrainer;
use crate::types::{DatasetStatistics, Hyperparameters, LabeledRow, Metrics, ScoredRow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// What a training call reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Validation metrics
    pub metrics: Metrics,
    pub artifact_path: PathBuf,
    pub version: String,
    pub hyperparameters: Hyperparameters,
    pub model_id: String,
    pub training_run_id: String,
    /// Rows with a usable timestamp
    pub row_count: u64,
    pub training_rows: usize,
    pub validation_rows: usize,
    /// Whether every row was used for both training and validation
    pub clone_mode: bool,
}

/// A finished training run that has not been persisted yet
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub artifact: ModelArtifact,
    pub statistics: DatasetStatistics,
    pub plan: SplitPlan,
}

/// Train a model from a CSV file and write its artifact.
///
/// # Arguments
/// * `path` - CSV file with a header row
/// * `config` - Column overrides, hyperparameters and artifact location
///
/// # Example
/// ```ignore
/// let config = TrainingConfig::new().with_column("risk", "risk_score");
/// let outcome = train_risk_model(Path::new("incidents.csv"), &config)?;
/// println!("{}", outcome.artifact_path.display());
/// ```
pub fn train_risk_model(path: &Path, config: &TrainingConfig) -> Result<TrainingOutcome, RiskModelError> {
    let pipeline = RiskModelPipeline::new(config.clone())?;
    pipeline.train(&CsvFileSource::new(path))
}

/// Evaluate a persisted artifact against a CSV file.
///
/// # Arguments
/// * `path` - CSV file with a header row
/// * `artifact_path` - Artifact JSON written by a previous training run
/// * `columns` - Logical column name → CSV header overrides
pub fn evaluate_risk_model(
    path: &Path,
    artifact_path: &Path,
    columns: &HashMap<String, String>,
) -> Result<Metrics, RiskModelError> {
    let artifact = ModelArtifact::load(artifact_path)?;
    let columns = ColumnResolver::resolve_named(columns)?;
    evaluate_artifact(&CsvFileSource::new(path), &columns, &artifact)
}

/// Score `artifact` against every usable row of `source`.
///
/// Rows are encoded with the artifact's own category vocabulary; risk and
/// labels are synthesized from the evaluation dataset's statistics.
pub fn evaluate_artifact(
    source: &dyn RowSource,
    columns: &LogicalColumnMap,
    artifact: &ModelArtifact,
) -> Result<Metrics, RiskModelError> {
    let encoder = FeatureEncoder::new(&artifact.categories);
    artifact.validate_dimensions(encoder.dimension())?;
    let model = artifact.model()?;

    let statistics = analyze_non_empty(source, columns)?;
    let rows = labeled_rows(source, columns, &statistics, &encoder)?;
    let metrics = EvaluationScorer::score(&model, &rows)?;

    info!(
        source = %source.describe(),
        model_id = %artifact.model_id,
        version = %artifact.version,
        rows = rows.len(),
        accuracy = metrics.accuracy,
        f1 = metrics.f1,
        "evaluation finished"
    );
    Ok(metrics)
}

/// Training pipeline bound to one configuration.
///
/// Holds no state between calls; each call reads its source from the start.
pub struct RiskModelPipeline {
    config: TrainingConfig,
    columns: LogicalColumnMap,
}

impl RiskModelPipeline {
    /// Create a pipeline, validating the configuration up front
    pub fn new(config: TrainingConfig) -> Result<Self, RiskModelError> {
        config.validate()?;
        let columns = config.column_map()?;
        Ok(Self { config, columns })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn columns(&self) -> &LogicalColumnMap {
        &self.columns
    }

    /// Statistics pass only
    pub fn analyze(&self, source: &dyn RowSource) -> Result<DatasetStatistics, RiskModelError> {
        StreamingCsvAnalyzer::analyze(source, &self.columns)
    }

    /// Run every training stage and return the artifact without writing it.
    ///
    /// Pipeline stages:
    /// 1. StreamingCsvAnalyzer - corpus statistics
    /// 2. RiskLabelSynthesizer + FeatureEncoder - row → features, risk, label
    /// 3. TrainValidationSplitter - arrival-order split, training normalization
    /// 4. LogisticRegressionTrainer - gradient descent
    /// 5. EvaluationScorer - validation metrics
    pub fn fit(&self, source: &dyn RowSource) -> Result<TrainingRun, RiskModelError> {
        let hyperparameters = self.config.resolved_hyperparameters();

        // Stage 1: statistics pass
        let statistics = analyze_non_empty(source, &self.columns)?;

        // Stage 2: encode and label
        let vocabulary = CategoryVocabulary::from_statistics(&statistics, self.config.max_categories);
        let encoder = FeatureEncoder::new(&vocabulary.categories);
        let rows = labeled_rows(source, &self.columns, &statistics, &encoder)?;
        if rows.is_empty() {
            return Err(RiskModelError::EmptyDataset(format!(
                "{} changed between passes",
                source.describe()
            )));
        }

        // Stage 3: split
        let split = TrainValidationSplitter::split(
            rows,
            hyperparameters.validation_split,
            encoder.dimension(),
        )?;

        // Stage 4: train
        let trainer = LogisticRegressionTrainer::new(hyperparameters);
        let model = trainer.fit(&split.training, &split.normalization)?;

        // Stage 5: validate
        let metrics = EvaluationScorer::score(&model, &split.validation)?;

        let artifact = ModelArtifact::from_training(
            self.config.model_id.clone(),
            Uuid::new_v4().to_string(),
            Utc::now(),
            &model,
            encoder.feature_names(),
            vocabulary.categories,
            vocabulary.overflowed,
            *trainer.hyperparameters(),
            metrics,
        );

        info!(
            source = %source.describe(),
            model_id = %artifact.model_id,
            rows = statistics.row_count,
            training_rows = split.plan.train_count,
            validation_rows = split.plan.validation_count,
            clone_mode = split.plan.clone_mode,
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            "training finished"
        );

        Ok(TrainingRun {
            artifact,
            statistics,
            plan: split.plan,
        })
    }

    /// Train and write the artifact below the configured directory
    pub fn train(&self, source: &dyn RowSource) -> Result<TrainingOutcome, RiskModelError> {
        let run = self.fit(source)?;
        let artifact_path = run.artifact.write_to(&self.config.artifact_dir)?;

        Ok(TrainingOutcome {
            metrics: run.artifact.metrics,
            artifact_path,
            version: run.artifact.version,
            hyperparameters: run.artifact.hyperparameters,
            model_id: run.artifact.model_id,
            training_run_id: run.artifact.training_run_id,
            row_count: run.statistics.row_count,
            training_rows: run.plan.train_count,
            validation_rows: run.plan.validation_count,
            clone_mode: run.plan.clone_mode,
        })
    }

    /// Evaluate an artifact against `source` using this pipeline's columns
    pub fn evaluate(
        &self,
        source: &dyn RowSource,
        artifact: &ModelArtifact,
    ) -> Result<Metrics, RiskModelError> {
        evaluate_artifact(source, &self.columns, artifact)
    }
}

fn analyze_non_empty(
    source: &dyn RowSource,
    columns: &LogicalColumnMap,
) -> Result<DatasetStatistics, RiskModelError> {
    let statistics = StreamingCsvAnalyzer::analyze(source, columns)?;
    if statistics.row_count == 0 {
        return Err(RiskModelError::EmptyDataset(format!(
            "{} has no rows with a usable timestamp ({} skipped)",
            source.describe(),
            statistics.skipped_rows
        )));
    }
    Ok(statistics)
}

/// Second pass: score, encode and label every usable row
fn labeled_rows(
    source: &dyn RowSource,
    columns: &LogicalColumnMap,
    statistics: &DatasetStatistics,
    encoder: &FeatureEncoder,
) -> Result<Vec<LabeledRow>, RiskModelError> {
    let synthesizer = RiskLabelSynthesizer::new(statistics);
    let mut scored = Vec::new();

    for record in IncidentStream::open(source, columns)? {
        let record = record?;
        let risk = synthesizer.risk_score(&record);
        scored.push(ScoredRow {
            features: encoder.encode(&record, risk),
            risk,
            provided_label: record.label,
            timestamp: record.observed_at.timestamp(),
        });
    }

    Ok(RiskLabelSynthesizer::resolve_labels(scored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HyperparameterInput;
    use crate::source::CsvTextSource;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn sample_incidents_csv() -> &'static str {
        "timestamp,latitude,longitude,category,risk_score,label\n\
         2024-01-15T08:00:00Z,40.7128,-74.0060,burglary,0.10,0\n\
         2024-01-15T09:00:00Z,40.7128,-74.0060,burglary,0.16,0\n\
         2024-01-15T10:00:00Z,40.7128,-74.0060,burglary,0.22,0\n\
         2024-01-15T11:00:00Z,40.7128,-74.0060,burglary,0.28,0\n\
         2024-01-15T12:00:00Z,40.7128,-74.0060,assault,0.72,1\n\
         2024-01-15T13:00:00Z,40.7128,-74.0060,assault,0.76,1\n\
         2024-01-15T14:00:00Z,40.7128,-74.0060,assault,0.80,1\n\
         2024-01-15T15:00:00Z,40.7128,-74.0060,assault,0.84,1\n\
         2024-01-15T16:00:00Z,40.7128,-74.0060,assault,0.88,1\n"
    }

    fn sample_unlabeled_csv() -> &'static str {
        "Timestamp,Lat,Lon,Offense Type\n\
         2024-02-01 01:00,40.71,-74.00,theft\n\
         2024-02-02 02:00,40.72,-74.01,theft\n\
         2024-02-03 03:00,40.73,-74.02,theft\n\
         2024-02-04 04:00,40.74,-74.03,assault\n\
         2024-02-05 05:00,40.75,-74.04,theft\n\
         2024-02-06 06:00,40.76,-74.05,vandalism\n\
         2024-02-07 07:00,40.77,-74.06,theft\n\
         2024-02-08 08:00,40.78,-74.07,assault\n\
         not a date,40.79,-74.08,theft\n\
         2024-02-10 10:00,40.80,-74.09,theft\n"
    }

    fn fixture_config(artifact_dir: &Path) -> TrainingConfig {
        TrainingConfig::new()
            .with_column("risk", "risk_score")
            .with_artifact_dir(artifact_dir)
            .with_hyperparameters(HyperparameterInput {
                learning_rate: Some(0.25),
                iterations: Some(800),
                validation_split: Some(0.2),
            })
    }

    fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_fixture_scenario_is_perfect() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), "incidents.csv", sample_incidents_csv());
        let outcome = train_risk_model(&csv, &fixture_config(&dir.path().join("models"))).unwrap();

        assert_eq!(
            outcome.metrics,
            Metrics {
                accuracy: 1.0,
                precision: 1.0,
                recall: 1.0,
                f1: 1.0
            }
        );
        assert_eq!(outcome.row_count, 9);
        assert_eq!(outcome.training_rows, 7);
        assert_eq!(outcome.validation_rows, 2);
        assert!(!outcome.clone_mode);
        assert_eq!(outcome.hyperparameters.iterations, 800);
        assert!(outcome.artifact_path.exists());
        assert!(outcome
            .artifact_path
            .ends_with(Path::new("incident-risk").join(format!("{}.json", outcome.version))));

        let artifact = ModelArtifact::load(&outcome.artifact_path).unwrap();
        assert_eq!(artifact.categories, vec!["assault", "burglary"]);
        assert_eq!(artifact.weights.len(), 5 + 2 + 1);
        assert_eq!(artifact.feature_names.len(), 7);
        assert_eq!(artifact.training_run_id, outcome.training_run_id);
    }

    #[test]
    fn test_training_is_deterministic() {
        let config = fixture_config(Path::new("unused"));
        let pipeline = RiskModelPipeline::new(config).unwrap();
        let source = CsvTextSource::new(sample_incidents_csv());

        let first = pipeline.fit(&source).unwrap();
        let second = pipeline.fit(&source).unwrap();
        assert_eq!(first.artifact.weights, second.artifact.weights);
        assert_eq!(first.artifact.feature_means, second.artifact.feature_means);
        assert_eq!(first.artifact.metrics, second.artifact.metrics);
        assert_ne!(first.artifact.training_run_id, second.artifact.training_run_id);
    }

    #[test]
    fn test_missing_latitude_fails() {
        let csv = "timestamp,longitude,category\n2024-01-15T08:00:00Z,-74.0,theft\n";
        let pipeline = RiskModelPipeline::new(TrainingConfig::new()).unwrap();
        let result = pipeline.fit(&CsvTextSource::new(csv));
        match result {
            Err(RiskModelError::MissingColumn(message)) => assert!(message.contains("latitude")),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_dataset_fails() {
        let pipeline = RiskModelPipeline::new(TrainingConfig::new()).unwrap();

        let header_only = CsvTextSource::new("timestamp,latitude,longitude,category\n");
        assert!(matches!(
            pipeline.fit(&header_only),
            Err(RiskModelError::EmptyDataset(_))
        ));

        let no_timestamps =
            CsvTextSource::new("timestamp,latitude,longitude,category\nyesterday,1,2,theft\n");
        assert!(matches!(
            pipeline.fit(&no_timestamps),
            Err(RiskModelError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_synthesized_labels_train() {
        let config = TrainingConfig::new()
            .with_column("latitude", "lat")
            .with_column("longitude", "lon")
            .with_column("category", "offense_type");
        let pipeline = RiskModelPipeline::new(config).unwrap();
        let run = pipeline.fit(&CsvTextSource::new(sample_unlabeled_csv())).unwrap();

        assert_eq!(run.statistics.row_count, 9);
        assert_eq!(run.statistics.skipped_rows, 1);
        assert!(!run.statistics.has_numeric_risk);
        assert_eq!(run.artifact.categories, vec!["assault", "theft", "vandalism"]);
        assert_eq!(run.plan.train_count + run.plan.validation_count, 9);
        assert_eq!(run.artifact.weights.len(), 5 + 3 + 1);
    }

    #[test]
    fn test_small_dataset_uses_clone_mode() {
        let csv = "timestamp,latitude,longitude,category,risk,label\n\
                   2024-01-15T08:00:00Z,1,2,theft,0.2,0\n\
                   2024-01-15T09:00:00Z,1,2,theft,0.9,1\n";
        let pipeline = RiskModelPipeline::new(TrainingConfig::new()).unwrap();
        let run = pipeline.fit(&CsvTextSource::new(csv)).unwrap();
        assert!(run.plan.clone_mode);
        assert_eq!(run.plan.train_count, 2);
    }

    #[test]
    fn test_category_cap_marks_overflow() {
        let config = fixture_config(Path::new("unused")).with_max_categories(1);
        let pipeline = RiskModelPipeline::new(config).unwrap();
        let run = pipeline.fit(&CsvTextSource::new(sample_incidents_csv())).unwrap();
        assert_eq!(run.artifact.categories, vec!["assault"]);
        assert!(run.artifact.category_overflowed);
        assert_eq!(run.artifact.weights.len(), 5 + 1 + 1);
    }

    #[test]
    fn test_evaluate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), "incidents.csv", sample_incidents_csv());
        let outcome = train_risk_model(&csv, &fixture_config(dir.path())).unwrap();

        let columns = HashMap::from([("risk".to_string(), "risk_score".to_string())]);
        let metrics = evaluate_risk_model(&csv, &outcome.artifact_path, &columns).unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.f1, 1.0);
    }

    #[test]
    fn test_evaluate_uses_artifact_vocabulary() {
        let pipeline = RiskModelPipeline::new(fixture_config(Path::new("unused"))).unwrap();
        let run = pipeline.fit(&CsvTextSource::new(sample_incidents_csv())).unwrap();

        // A category the artifact never saw encodes as an all-zero block
        let csv = "timestamp,latitude,longitude,category,risk_score,label\n\
                   2024-01-16T08:00:00Z,40.7128,-74.0060,arson,0.05,0\n\
                   2024-01-16T16:00:00Z,40.7128,-74.0060,assault,0.95,1\n";
        let metrics = pipeline.evaluate(&CsvTextSource::new(csv), &run.artifact).unwrap();
        assert!(metrics.accuracy >= 0.0 && metrics.accuracy <= 1.0);
    }

    #[test]
    fn test_evaluate_malformed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), "incidents.csv", sample_incidents_csv());
        let artifact = write_csv(
            dir.path(),
            "artifact.json",
            r#"{"feature_means": [0.0], "feature_std_devs": [1.0], "categories": []}"#,
        );

        let result = evaluate_risk_model(&csv, &artifact, &HashMap::new());
        assert!(matches!(result, Err(RiskModelError::MalformedArtifact(_))));
    }

    #[test]
    fn test_evaluate_dimension_mismatch() {
        // Internally consistent, but two categories imply 7 features, not 3
        let artifact = ModelArtifact::from_json(
            r#"{
                "weights": [0.0, 1.0, 1.0, 1.0],
                "feature_means": [0.0, 0.0, 0.0],
                "feature_std_devs": [1.0, 1.0, 1.0],
                "categories": ["assault", "burglary"]
            }"#,
        )
        .unwrap();

        let columns = ColumnResolver::resolve(&Default::default());
        let result = evaluate_artifact(
            &CsvTextSource::new(sample_incidents_csv()),
            &columns,
            &artifact,
        );
        assert!(matches!(
            result,
            Err(RiskModelError::DimensionMismatch { expected: 8, actual: 4, .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrainingConfig::new().with_max_categories(0);
        assert!(matches!(
            RiskModelPipeline::new(config),
            Err(RiskModelError::InvalidConfig(_))
        ));
    }
}
