//! Error types for incident risk training and evaluation

use thiserror::Error;

/// Errors that can occur while analysing, training or evaluating
#[derive(Debug, Error)]
pub enum RiskModelError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Malformed model artifact: {0}")]
    MalformedArtifact(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RiskModelError {
    pub(crate) fn dimension_mismatch(
        context: impl Into<String>,
        expected: usize,
        actual: usize,
    ) -> Self {
        RiskModelError::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

// Read failures surface as `Io` whether or not they came through the CSV reader
impl From<csv::Error> for RiskModelError {
    fn from(err: csv::Error) -> Self {
        if !err.is_io_error() {
            return RiskModelError::Csv(err);
        }
        match err.into_kind() {
            csv::ErrorKind::Io(io) => RiskModelError::Io(io),
            other => RiskModelError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_csv_io_error_maps_to_io() {
        let csv_err = csv::Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        match RiskModelError::from(csv_err) {
            RiskModelError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn test_csv_syntax_error_stays_csv() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\nc\n".as_bytes());
        let err = reader
            .records()
            .find_map(Result::err)
            .expect("unequal lengths should fail");
        assert!(matches!(RiskModelError::from(err), RiskModelError::Csv(_)));
    }
}
