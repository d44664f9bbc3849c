// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation reports and plots for binary text classifiers
//!
//! This crate provides:
//! - Labeled dataset loading (CSV, seeded synthetic data)
//! - A `ProbabilityScorer` seam for batched inference
//! - Metrics (confusion matrix, classification report, ROC, precision-recall)
//! - PNG plots and a text report written to an output directory
//! - Per-artifact outcomes so one failed artifact never blocks the others

pub mod config;
pub mod datasets;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod plots;
pub mod reporter;

pub use config::{Config, Device, InferenceConfig, PlotConfig};
pub use datasets::{threshold_label, ClassLabel, EvaluationDataset, ScoredDataset, DECISION_THRESHOLD};
pub use error::{InferenceError, MetricsError, ReportError};
pub use inference::{KeywordScorer, PrecomputedScorer, ProbabilityScorer};
pub use metrics::{ClassificationReport, ConfusionMatrix, EvaluationMetrics, PrecisionRecallCurve, RocCurve};
pub use reporter::{
    generate_evaluation_reports_and_plots, ArtifactKind, ArtifactOutcome, EvaluationReporter, EvaluationRun,
    RunSummary,
};
