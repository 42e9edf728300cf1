//! Incident Risk - streaming CSV ingestion and logistic-regression risk classification
//!
//! Turns a CSV of incident records into a binary risk classifier through a
//! deterministic pipeline: column resolution → streaming analysis → risk and
//! label synthesis → feature encoding → train/validation split with online
//! normalization → gradient-descent training → validation metrics → model
//! artifact. A persisted artifact can later be scored against a fresh dataset.
//!
//! ## Modules
//!
//! - **Ingestion**: `columns`, `source`, `analyzer`
//! - **Feature preparation**: `synthesizer`, `encoder`, `normalizer`, `splitter`
//! - **Modelling**: `trainer`, `metrics`, `evaluation`, `artifact`
//! - **Orchestration**: `config`, `pipeline`

pub mod analyzer;
pub mod artifact;
pub mod columns;
pub mod config;
pub mod encoder;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod source;
pub mod splitter;
pub mod synthesizer;
pub mod trainer;
pub mod types;

pub use artifact::ModelArtifact;
pub use columns::{ColumnResolver, LogicalColumnMap};
pub use config::{HyperparameterInput, TrainingConfig};
pub use error::RiskModelError;
pub use pipeline::{evaluate_risk_model, train_risk_model, RiskModelPipeline, TrainingOutcome};
pub use source::{CsvFileSource, CsvTextSource, RowSource};
pub use types::{DatasetStatistics, Hyperparameters, LabeledRow, Metrics};

/// Crate version recorded in every artifact
pub const INCIDENT_RISK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in every artifact
pub const PRODUCER_NAME: &str = "incident-risk";
