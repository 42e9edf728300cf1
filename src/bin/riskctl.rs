//! riskctl - Command-line interface for Incident Risk
//!
//! Commands:
//! - train: Train a model from a CSV file and write its artifact
//! - evaluate: Score an artifact against a CSV file
//! - analyze: Print the streaming statistics of a CSV file
//! - inspect: Validate an artifact and summarize its weights
//! - schema: Print the input column contract or the artifact schema

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use incident_risk::artifact::ArtifactSummary;
use incident_risk::types::{LogicalColumn, Metrics};
use incident_risk::{
    CsvFileSource, DatasetStatistics, HyperparameterInput, ModelArtifact, RiskModelError,
    RiskModelPipeline, TrainingConfig, TrainingOutcome, INCIDENT_RISK_VERSION, PRODUCER_NAME,
};

/// riskctl - Incident risk classifier training and evaluation
#[derive(Parser)]
#[command(name = "riskctl")]
#[command(version = INCIDENT_RISK_VERSION)]
#[command(about = "Train and evaluate incident risk classifiers from CSV data", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a CSV file and write its artifact
    Train {
        /// Input CSV file (first row is the header)
        #[arg(short, long)]
        input: PathBuf,

        /// Training configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Column override as logical=header (repeatable)
        #[arg(long = "column", value_name = "LOGICAL=HEADER")]
        columns: Vec<String>,

        /// Gradient descent learning rate [0.0001, 1.0]
        #[arg(long)]
        learning_rate: Option<f64>,

        /// Training epochs [100, 5000]
        #[arg(long, allow_hyphen_values = true)]
        iterations: Option<i64>,

        /// Fraction of rows held out for validation [0.1, 0.5]
        #[arg(long)]
        validation_split: Option<f64>,

        /// Directory artifacts are written below
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Model identifier (artifact subdirectory)
        #[arg(long)]
        model_id: Option<String>,

        /// Maximum number of one-hot category slots
        #[arg(long)]
        max_categories: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a trained artifact against a CSV file
    Evaluate {
        /// Input CSV file (first row is the header)
        #[arg(short, long)]
        input: PathBuf,

        /// Artifact JSON written by `riskctl train`
        #[arg(short, long)]
        artifact: PathBuf,

        /// Column override as logical=header (repeatable)
        #[arg(long = "column", value_name = "LOGICAL=HEADER")]
        columns: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print streaming statistics for a CSV file
    Analyze {
        /// Input CSV file (first row is the header)
        #[arg(short, long)]
        input: PathBuf,

        /// Training configuration file (JSON), for its column overrides
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Column override as logical=header (repeatable)
        #[arg(long = "column", value_name = "LOGICAL=HEADER")]
        columns: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an artifact and summarize it
    Inspect {
        /// Artifact JSON file
        artifact: PathBuf,

        /// Number of strongest weights to show
        #[arg(long, default_value = "10")]
        top: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input CSV column contract
    Input,
    /// Model artifact document
    Artifact,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "incident_risk=info,riskctl=info",
        _ => "incident_risk=debug,riskctl=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), RiskCliError> {
    match cli.command {
        Commands::Train {
            input,
            config,
            columns,
            learning_rate,
            iterations,
            validation_split,
            artifact_dir,
            model_id,
            max_categories,
            json,
        } => {
            let mut training = load_config(config.as_deref())?;
            for (logical, physical) in parse_columns(&columns)? {
                training = training.with_column(logical, physical);
            }
            let hyperparameters = training.hyperparameters.merged_with(HyperparameterInput {
                learning_rate,
                iterations,
                validation_split,
            });
            training = training.with_hyperparameters(hyperparameters);
            if let Some(dir) = artifact_dir {
                training = training.with_artifact_dir(dir);
            }
            if let Some(id) = model_id {
                training = training.with_model_id(id);
            }
            if let Some(max) = max_categories {
                training = training.with_max_categories(max);
            }
            cmd_train(&input, training, json)
        }
        Commands::Evaluate {
            input,
            artifact,
            columns,
            json,
        } => cmd_evaluate(&input, &artifact, &columns, json),
        Commands::Analyze {
            input,
            config,
            columns,
            json,
        } => cmd_analyze(&input, config.as_deref(), &columns, json),
        Commands::Inspect { artifact, top, json } => cmd_inspect(&artifact, top, json),
        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

/// JSON when requested or when stdout is not a terminal
fn wants_json(json: bool) -> bool {
    json || !atty::is(atty::Stream::Stdout)
}

fn load_config(path: Option<&Path>) -> Result<TrainingConfig, RiskCliError> {
    match path {
        Some(path) => Ok(TrainingConfig::from_json_file(path)?),
        None => Ok(TrainingConfig::new()),
    }
}

/// Parse `logical=header` pairs
fn parse_columns(raw: &[String]) -> Result<Vec<(String, String)>, RiskCliError> {
    raw.iter()
        .map(|pair| {
            let (logical, physical) = pair
                .split_once('=')
                .ok_or_else(|| RiskCliError::InvalidColumn(pair.clone()))?;
            if LogicalColumn::parse(logical).is_none() || physical.trim().is_empty() {
                return Err(RiskCliError::InvalidColumn(pair.clone()));
            }
            Ok((logical.trim().to_string(), physical.trim().to_string()))
        })
        .collect()
}

fn column_overrides(raw: &[String]) -> Result<HashMap<String, String>, RiskCliError> {
    Ok(parse_columns(raw)?.into_iter().collect())
}

fn cmd_train(input: &Path, config: TrainingConfig, json: bool) -> Result<(), RiskCliError> {
    let pipeline = RiskModelPipeline::new(config)?;
    let outcome = pipeline.train(&CsvFileSource::new(input))?;

    if wants_json(json) {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &TrainingOutcome) {
    println!("Training Report");
    println!("===============");
    println!("Model:          {} ({})", outcome.model_id, outcome.version);
    println!("Run:            {}", outcome.training_run_id);
    println!("Artifact:       {}", outcome.artifact_path.display());
    println!("Rows:           {}", outcome.row_count);
    println!("Training rows:  {}", outcome.training_rows);
    if outcome.clone_mode {
        println!("Validation:     all rows (dataset too small to hold out)");
    } else {
        println!("Validation:     {} rows", outcome.validation_rows);
    }
    println!(
        "Hyperparameters: learning_rate={} iterations={} validation_split={}",
        outcome.hyperparameters.learning_rate,
        outcome.hyperparameters.iterations,
        outcome.hyperparameters.validation_split
    );
    println!();
    print_metrics(&outcome.metrics);
}

fn print_metrics(metrics: &Metrics) {
    println!("Accuracy:  {:.4}", metrics.accuracy);
    println!("Precision: {:.4}", metrics.precision);
    println!("Recall:    {:.4}", metrics.recall);
    println!("F1:        {:.4}", metrics.f1);
}

fn cmd_evaluate(input: &Path, artifact: &Path, columns: &[String], json: bool) -> Result<(), RiskCliError> {
    let overrides = column_overrides(columns)?;
    let metrics = incident_risk::evaluate_risk_model(input, artifact, &overrides)?;

    if wants_json(json) {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!("Evaluation Report");
        println!("=================");
        println!("Artifact: {}", artifact.display());
        println!("Input:    {}", input.display());
        println!();
        print_metrics(&metrics);
    }
    Ok(())
}

fn cmd_analyze(
    input: &Path,
    config: Option<&Path>,
    columns: &[String],
    json: bool,
) -> Result<(), RiskCliError> {
    let mut training = load_config(config)?;
    for (logical, physical) in parse_columns(columns)? {
        training = training.with_column(logical, physical);
    }
    let pipeline = RiskModelPipeline::new(training)?;
    let statistics = pipeline.analyze(&CsvFileSource::new(input))?;

    if wants_json(json) {
        println!("{}", serde_json::to_string_pretty(&statistics)?);
    } else {
        print_statistics(input, &statistics);
    }
    Ok(())
}

fn print_statistics(input: &Path, statistics: &DatasetStatistics) {
    println!("Dataset Analysis");
    println!("================");
    println!("Input:        {}", input.display());
    println!("Rows:         {}", statistics.row_count);
    println!("Skipped rows: {}", statistics.skipped_rows);
    println!("Numeric risk: {}", statistics.has_numeric_risk);
    match (statistics.min_time, statistics.max_time) {
        (Some(min), Some(max)) => println!("Time range:   {} .. {} ({}s)", min, max, max - min),
        _ => println!("Time range:   n/a"),
    }
    println!("\nCategories ({}):", statistics.category_counts.len());
    for (category, count) in &statistics.category_counts {
        println!("  {:<24} {}", category, count);
    }
}

fn cmd_inspect(path: &Path, top: usize, json: bool) -> Result<(), RiskCliError> {
    let artifact = ModelArtifact::load(path)?;
    let mut checks = vec![InspectCheck {
        name: "artifact".to_string(),
        status: CheckStatus::Ok,
        message: format!(
            "{} weights over {} features",
            artifact.weights.len(),
            artifact.dimension()
        ),
    }];

    checks.push(if artifact.producer.version == INCIDENT_RISK_VERSION {
        InspectCheck {
            name: "producer".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} {}", artifact.producer.name, artifact.producer.version),
        }
    } else {
        InspectCheck {
            name: "producer".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "written by {} {}, this is {} {}",
                artifact.producer.name, artifact.producer.version, PRODUCER_NAME, INCIDENT_RISK_VERSION
            ),
        }
    });

    if artifact.category_overflowed {
        checks.push(InspectCheck {
            name: "categories".to_string(),
            status: CheckStatus::Warning,
            message: format!(
                "vocabulary capped at {} categories; others encode as unknown",
                artifact.categories.len()
            ),
        });
    }

    let report = InspectReport {
        path: path.display().to_string(),
        checks,
        summary: artifact.summary(top),
    };

    if wants_json(json) {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let summary = &report.summary;
        println!("Artifact Report");
        println!("===============");
        println!("Path:     {}", report.path);
        println!("Model:    {} ({})", summary.model_id, summary.version);
        println!("Trained:  {}", summary.trained_at.to_rfc3339());
        println!("Features: {} ({} categories)", summary.dimension, summary.category_count);
        println!("\nChecks:");
        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "✓",
                CheckStatus::Warning => "⚠",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
        println!("\nStrongest weights (bias {:+.4}):", summary.bias);
        for weight in &summary.top_weights {
            println!("  {:<28} {:+.4}", weight.feature, weight.weight);
        }
        println!();
        print_metrics(&summary.metrics);
    }
    Ok(())
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), RiskCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&get_input_json_schema())?);
            } else {
                println!("Input: CSV with a header row");
                println!();
                println!("Headers are matched after normalization (trim, lower-case,");
                println!("non-alphanumeric runs become '_'). Override with --column logical=header.");
                println!();
                println!("Required columns:");
                for column in LogicalColumn::REQUIRED {
                    println!("  - {}", column);
                }
                println!("Optional columns:");
                println!("  - risk   numeric, clamped to [0, 1]; synthesized when absent");
                println!("  - label  0/1 (or true/false, yes/no); synthesized when absent");
                println!();
                println!("Timestamps: RFC 3339, YYYY-MM-DD[ HH:MM[:SS]], MM/DD/YYYY[ HH:MM[:SS]],");
                println!("or epoch seconds/milliseconds. Rows with other timestamps are skipped.");
            }
        }
        SchemaType::Artifact => {
            if json_schema {
                println!("{}", serde_json::to_string_pretty(&get_artifact_json_schema())?);
            } else {
                println!("Artifact: <artifact_dir>/<model_id>/<version>.json");
                println!();
                println!("- model_id, training_run_id, trained_at (ISO-8601), version");
                println!("- weights: bias first, then one weight per feature");
                println!("- feature_names: hour_of_day, day_of_week, latitude, longitude, risk_score, category_<name>...");
                println!("- feature_means, feature_std_devs: training-set normalization");
                println!("- categories, category_overflowed");
                println!("- hyperparameters: {{ learning_rate, iterations, validation_split }}");
                println!("- metrics: {{ accuracy, precision, recall, f1 }}");
                println!("- producer: {{ name, version }}");
            }
        }
    }
    Ok(())
}

fn get_input_json_schema() -> serde_json::Value {
    let columns: Vec<&str> = LogicalColumn::ALL.iter().map(|c| c.as_str()).collect();
    let required: Vec<&str> = LogicalColumn::REQUIRED.iter().map(|c| c.as_str()).collect();
    serde_json::json!({
        "title": "incident_risk.input.v1",
        "description": "Logical CSV columns read by riskctl",
        "columns": columns,
        "required": required,
        "defaults": "each logical column matches the header of the same name"
    })
}

fn get_artifact_json_schema() -> serde_json::Value {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "incident_risk.artifact.v1",
        "description": "Model artifact written by riskctl train",
        "type": "object",
        "required": ["weights", "feature_means", "feature_std_devs", "categories"],
        "properties": {
            "model_id": { "type": "string" },
            "training_run_id": { "type": "string" },
            "trained_at": { "type": "string", "format": "date-time" },
            "version": { "type": "string" },
            "weights": { "type": "array", "items": { "type": "number" } },
            "feature_names": { "type": "array", "items": { "type": "string" } },
            "feature_means": { "type": "array", "items": { "type": "number" } },
            "feature_std_devs": { "type": "array", "items": { "type": "number" } },
            "categories": { "type": "array", "items": { "type": "string" } },
            "category_overflowed": { "type": "boolean" },
            "hyperparameters": {
                "type": "object",
                "properties": {
                    "learning_rate": { "type": "number", "minimum": 0.0001, "maximum": 1.0 },
                    "iterations": { "type": "integer", "minimum": 100, "maximum": 5000 },
                    "validation_split": { "type": "number", "minimum": 0.1, "maximum": 0.5 }
                }
            },
            "metrics": {
                "type": "object",
                "properties": {
                    "accuracy": { "type": "number" },
                    "precision": { "type": "number" },
                    "recall": { "type": "number" },
                    "f1": { "type": "number" }
                }
            },
            "producer": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "version": { "type": "string" }
                }
            }
        }
    })
}

// Error types

#[derive(Debug)]
enum RiskCliError {
    Model(RiskModelError),
    Json(serde_json::Error),
    InvalidColumn(String),
}

impl From<RiskModelError> for RiskCliError {
    fn from(e: RiskModelError) -> Self {
        RiskCliError::Model(e)
    }
}

impl From<serde_json::Error> for RiskCliError {
    fn from(e: serde_json::Error) -> Self {
        RiskCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RiskCliError> for CliError {
    fn from(e: RiskCliError) -> Self {
        match e {
            RiskCliError::Model(e) => {
                let (code, hint) = match &e {
                    RiskModelError::MissingColumn(_) => (
                        "MISSING_COLUMN",
                        "Map the column with --column logical=header or run 'riskctl schema input'",
                    ),
                    RiskModelError::EmptyDataset(_) => (
                        "EMPTY_DATASET",
                        "Ensure the file has data rows with parseable timestamps",
                    ),
                    RiskModelError::MalformedArtifact(_) => (
                        "MALFORMED_ARTIFACT",
                        "Run 'riskctl inspect' on the artifact for details",
                    ),
                    RiskModelError::DimensionMismatch { .. } => (
                        "DIMENSION_MISMATCH",
                        "The artifact does not match the encoded features; retrain or use the matching artifact",
                    ),
                    RiskModelError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    RiskModelError::Csv(_) => ("CSV_ERROR", "Check the CSV syntax and encoding"),
                    RiskModelError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    RiskModelError::InvalidConfig(_) => (
                        "INVALID_CONFIG",
                        "Check the configuration file and flags",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            RiskCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RiskCliError::InvalidColumn(pair) => CliError {
                code: "INVALID_COLUMN".to_string(),
                message: format!("Invalid column override '{}'", pair),
                hint: Some(
                    "Use logical=header where logical is one of timestamp, latitude, longitude, category, risk, label"
                        .to_string(),
                ),
            },
        }
    }
}

#[derive(serde::Serialize)]
struct InspectReport {
    path: String,
    checks: Vec<InspectCheck>,
    summary: ArtifactSummary,
}

#[derive(serde::Serialize)]
struct InspectCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
}
