// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error kinds reported by the evaluation reporter
//!
//! Every artifact generator returns its own `Result`, so a caller can tell
//! which artifacts were produced without reading the logs.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while computing metrics or curves
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("empty input: no samples to evaluate")]
    EmptyInput,

    #[error("length mismatch: {expected} true labels but {actual} predictions")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("only one class ({label}) present in true labels; {metric} is undefined")]
    SingleClass { label: i64, metric: &'static str },

    #[error("labels must be 0 or 1 for {metric}, found {label}")]
    NonBinaryLabel { label: i64, metric: &'static str },

    #[error("score {value} at position {index} is not a finite number")]
    NonFiniteScore { index: usize, value: f64 },
}

/// Failures raised by an inference capability
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("scorer '{scorer}' failed on batch {batch}: {message}")]
    Batch {
        scorer: String,
        batch: usize,
        message: String,
    },

    #[error("scorer returned {actual} probabilities for {expected} texts")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("probability {value} at position {index} is outside [0, 1]")]
    OutOfRange { index: usize, value: f64 },

    #[error("invalid device '{0}': expected 'cpu', 'cuda' or 'cuda:N'")]
    InvalidDevice(String),
}

/// Top-level error for a reporting run or a single artifact
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("dataset is empty")]
    EmptyDataset,

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("metrics computation failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("failed to render {artifact}: {message}")]
    Render { artifact: String, message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn render(artifact: &str, err: impl std::fmt::Display) -> Self {
        Self::Render {
            artifact: artifact.to_string(),
            message: err.to_string(),
        }
    }

    /// Short machine-readable kind, used in summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyDataset => "empty_dataset",
            Self::Inference(_) => "inference",
            Self::Metrics(_) => "metrics",
            Self::Render { .. } => "render",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = ReportError::from(MetricsError::EmptyInput);
        assert_eq!(err.kind(), "metrics");

        let err = ReportError::io("/tmp/x", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_single_class_message() {
        let err = MetricsError::SingleClass { label: 0, metric: "ROC curve" };
        assert!(err.to_string().contains("only one class (0)"));
    }
}
