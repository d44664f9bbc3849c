// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation reporter
//!
//! Orchestrates:
//! - Probability scoring through the inference capability
//! - Thresholding into predicted labels
//! - Confusion matrix heatmap
//! - Classification report
//! - ROC and precision-recall curves
//!
//! Each artifact is generated independently; a failure is logged and recorded
//! in the run's outcomes, and the remaining artifacts are still produced.

use crate::config::Config;
use crate::datasets::{ClassLabel, EvaluationDataset, ScoredDataset};
use crate::error::ReportError;
use crate::inference::ProbabilityScorer;
use crate::metrics::{precision_recall_curve, roc_curve, ClassificationReport, ConfusionMatrix, EvaluationMetrics};
use crate::plots::{self, PlotStyle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The four artifacts written by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ConfusionMatrix,
    ClassificationReport,
    RocCurve,
    PrecisionRecallCurve,
}

impl ArtifactKind {
    /// Generation order
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::ConfusionMatrix,
        ArtifactKind::ClassificationReport,
        ArtifactKind::RocCurve,
        ArtifactKind::PrecisionRecallCurve,
    ];

    /// Fixed file name inside the output directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::ConfusionMatrix => "confusion_matrix.png",
            ArtifactKind::ClassificationReport => "classification_report.txt",
            ArtifactKind::RocCurve => "roc_curve.png",
            ArtifactKind::PrecisionRecallCurve => "precision_recall_curve.png",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::ConfusionMatrix => "Confusion matrix",
            ArtifactKind::ClassificationReport => "Classification report",
            ArtifactKind::RocCurve => "ROC curve",
            ArtifactKind::PrecisionRecallCurve => "Precision-Recall curve",
        };
        f.write_str(name)
    }
}

/// Result of generating one artifact
#[derive(Debug)]
pub struct ArtifactOutcome {
    pub kind: ArtifactKind,
    pub result: Result<PathBuf, ReportError>,
}

impl ArtifactOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(PathBuf::as_path)
    }
}

/// Everything a completed run produced
#[derive(Debug)]
pub struct EvaluationRun {
    /// Input table with `predicted_proba` and predicted label columns
    pub scored: ScoredDataset,
    /// Summary metrics, when the labels allow computing them
    pub metrics: Option<EvaluationMetrics>,
    /// One outcome per artifact, in generation order
    pub artifacts: Vec<ArtifactOutcome>,
    pub output_dir: PathBuf,
    pub timestamp: DateTime<Utc>,
}

impl EvaluationRun {
    pub fn outcome(&self, kind: ArtifactKind) -> Option<&ArtifactOutcome> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn all_succeeded(&self) -> bool {
        self.artifacts.iter().all(ArtifactOutcome::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.artifacts.iter().filter(|a| !a.is_success())
    }

    /// Serializable digest of the run
    pub fn summary(&self) -> RunSummary {
        let metrics = self.metrics.as_ref();
        RunSummary {
            dataset: self.scored.name.clone(),
            samples: self.scored.len(),
            output_dir: self.output_dir.clone(),
            accuracy: metrics.map(|m| m.classification.accuracy),
            mcc: metrics.and_then(|m| m.mcc),
            auc_roc: metrics.and_then(|m| m.auc_roc),
            average_precision: metrics.and_then(|m| m.average_precision),
            brier_score: metrics.and_then(|m| m.brier_score),
            artifacts: self
                .artifacts
                .iter()
                .map(|a| ArtifactStatus {
                    artifact: a.kind,
                    file: a.kind.file_name().to_string(),
                    ok: a.is_success(),
                    error_kind: a.result.as_ref().err().map(|e| e.kind().to_string()),
                    error: a.result.as_ref().err().map(|e| e.to_string()),
                })
                .collect(),
            timestamp: self.timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub dataset: String,
    pub samples: usize,
    pub output_dir: PathBuf,
    pub accuracy: Option<f64>,
    pub mcc: Option<f64>,
    pub auc_roc: Option<f64>,
    pub average_precision: Option<f64>,
    pub brier_score: Option<f64>,
    pub artifacts: Vec<ArtifactStatus>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStatus {
    pub artifact: ArtifactKind,
    pub file: String,
    pub ok: bool,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

/// Generates the evaluation artifacts for a labeled dataset
pub struct EvaluationReporter {
    config: Config,
}

impl EvaluationReporter {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.evaluation.output_dir
    }

    /// Score the dataset, then write all four artifacts.
    ///
    /// Returns `Err` only when nothing could be generated (empty dataset,
    /// inference failure, output directory not creatable). Per-artifact
    /// failures are reported in `EvaluationRun::artifacts`.
    pub fn run(&self, dataset: &EvaluationDataset, scorer: &dyn ProbabilityScorer) -> Result<EvaluationRun, ReportError> {
        tracing::info!("Generating evaluation reports and plots...");

        if dataset.is_empty() {
            return Err(ReportError::EmptyDataset);
        }

        tracing::info!("Calculating predicted probabilities...");
        let texts = dataset.texts();
        let probabilities = scorer.predict_proba(&texts, &self.config.inference)?;
        let scored = dataset.with_probabilities(probabilities)?;

        self.report_scored(scored)
    }

    /// Write all four artifacts for an already-scored dataset
    pub fn report_scored(&self, scored: ScoredDataset) -> Result<EvaluationRun, ReportError> {
        if scored.is_empty() {
            return Err(ReportError::EmptyDataset);
        }

        let output_dir = self.output_dir().to_path_buf();
        std::fs::create_dir_all(&output_dir).map_err(|e| ReportError::io(&output_dir, e))?;

        let y_true = scored.true_labels();
        let y_pred = scored.predicted_labels();
        let probabilities = scored.probabilities();
        let style = PlotStyle::from_config(&self.config.plot);

        let artifacts: Vec<ArtifactOutcome> = ArtifactKind::ALL
            .iter()
            .map(|&kind| {
                let result = match kind {
                    ArtifactKind::ConfusionMatrix => {
                        self.generate_confusion_matrix(&y_true, &y_pred, &output_dir, &style)
                    }
                    ArtifactKind::ClassificationReport => {
                        self.generate_classification_report(&y_true, &y_pred, &output_dir)
                    }
                    ArtifactKind::RocCurve => self.generate_roc_curve(&y_true, &probabilities, &output_dir, &style),
                    ArtifactKind::PrecisionRecallCurve => {
                        self.generate_precision_recall_curve(&y_true, &probabilities, &output_dir, &style)
                    }
                };
                log_outcome(kind, &result);
                ArtifactOutcome { kind, result }
            })
            .collect();

        let metrics = EvaluationMetrics::from_predictions_with_probs(&y_true, &y_pred, &probabilities)
            .map_err(|e| tracing::warn!("Could not compute summary metrics: {}", e))
            .ok();

        let failures = artifacts.iter().filter(|a| !a.is_success()).count();
        if failures == 0 {
            tracing::info!("Evaluation reports and plots generated successfully.");
        } else {
            tracing::warn!(
                "Evaluation finished with {} of {} artifacts failed",
                failures,
                artifacts.len()
            );
        }

        Ok(EvaluationRun {
            scored,
            metrics,
            artifacts,
            output_dir,
            timestamp: Utc::now(),
        })
    }

    /// Confusion matrix heatmap (1x1 when only one class is present)
    pub fn generate_confusion_matrix(
        &self,
        y_true: &[ClassLabel],
        y_pred: &[ClassLabel],
        output_dir: &Path,
        style: &PlotStyle,
    ) -> Result<PathBuf, ReportError> {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        plots::plot_confusion_matrix(&cm, &output_dir.join(ArtifactKind::ConfusionMatrix.file_name()), style)
    }

    /// Text classification report (single row when only one class is present)
    pub fn generate_classification_report(
        &self,
        y_true: &[ClassLabel],
        y_pred: &[ClassLabel],
        output_dir: &Path,
    ) -> Result<PathBuf, ReportError> {
        let report = ClassificationReport::from_predictions(y_true, y_pred)?;
        let path = output_dir.join(ArtifactKind::ClassificationReport.file_name());
        std::fs::write(&path, report.format()).map_err(|e| ReportError::io(&path, e))?;
        Ok(path)
    }

    /// ROC curve; needs both classes in `y_true`
    pub fn generate_roc_curve(
        &self,
        y_true: &[ClassLabel],
        probabilities: &[f64],
        output_dir: &Path,
        style: &PlotStyle,
    ) -> Result<PathBuf, ReportError> {
        let curve = roc_curve(y_true, probabilities)?;
        plots::plot_roc_curve(&curve, &output_dir.join(ArtifactKind::RocCurve.file_name()), style)
    }

    /// Precision-recall curve; needs both classes in `y_true`
    pub fn generate_precision_recall_curve(
        &self,
        y_true: &[ClassLabel],
        probabilities: &[f64],
        output_dir: &Path,
        style: &PlotStyle,
    ) -> Result<PathBuf, ReportError> {
        let curve = precision_recall_curve(y_true, probabilities)?;
        plots::plot_precision_recall_curve(
            &curve,
            &output_dir.join(ArtifactKind::PrecisionRecallCurve.file_name()),
            style,
        )
    }
}

fn log_outcome(kind: ArtifactKind, result: &Result<PathBuf, ReportError>) {
    match result {
        Ok(path) => tracing::info!("{} saved to {}.", kind, path.display()),
        Err(e) => tracing::error!("Failed to generate {}: {}", kind, e),
    }
}

/// Run the reporter, logging instead of returning any failure.
///
/// Returns the run when at least the scoring step succeeded.
pub fn generate_evaluation_reports_and_plots(
    dataset: &EvaluationDataset,
    scorer: &dyn ProbabilityScorer,
    config: &Config,
) -> Option<EvaluationRun> {
    match EvaluationReporter::new(config.clone()).run(dataset, scorer) {
        Ok(run) => Some(run),
        Err(e) => {
            tracing::error!("Failed to generate evaluation reports and plots: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InferenceError, MetricsError};
    use crate::inference::{KeywordScorer, PrecomputedScorer};

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::with_output_dir(dir);
        config.inference.show_progress = false;
        config
    }

    fn dataset(labels: &[ClassLabel]) -> EvaluationDataset {
        let texts: Vec<String> = (0..labels.len()).map(|i| format!("text {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        EvaluationDataset::from_columns("test", labels, &refs).unwrap()
    }

    fn assert_all_files(dir: &Path) {
        for kind in ArtifactKind::ALL {
            let path = dir.join(kind.file_name());
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_example_run() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested").join("eval");
        let reporter = EvaluationReporter::new(config_for(&out));
        let scorer = PrecomputedScorer::new(vec![0.1, 0.4, 0.6, 0.9]);

        let run = reporter.run(&dataset(&[0, 0, 1, 1]), &scorer).expect("run succeeds");

        assert!(run.all_succeeded());
        assert_all_files(&out);
        assert_eq!(run.scored.predicted_labels(), vec![0, 0, 1, 1]);

        let metrics = run.metrics.as_ref().unwrap();
        assert_eq!(metrics.confusion_matrix.counts, vec![vec![2, 0], vec![0, 2]]);
        assert!((metrics.auc_roc.unwrap() - 1.0).abs() < 1e-9);
        assert!((metrics.average_precision.unwrap() - 1.0).abs() < 1e-9);

        let report = std::fs::read_to_string(out.join("classification_report.txt")).unwrap();
        assert!(report.contains("precision"));
        assert!(report.contains("weighted avg"));
    }

    #[test]
    fn test_threshold_boundary_in_run() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let scorer = PrecomputedScorer::new(vec![0.5, 0.49, 0.2, 0.8]);

        let run = reporter.run(&dataset(&[1, 0, 0, 1]), &scorer).unwrap();
        assert_eq!(run.scored.predicted_labels(), vec![1, 0, 0, 1]);
    }

    #[test]
    fn test_rerun_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let data = EvaluationDataset::load_synthetic(60, 7);

        let first = reporter.run(&data, &KeywordScorer::new()).unwrap();
        assert!(first.all_succeeded());
        let second = reporter.run(&data, &KeywordScorer::new()).unwrap();
        assert!(second.all_succeeded());
        assert_all_files(tmp.path());
    }

    #[test]
    fn test_single_class_run() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let scorer = PrecomputedScorer::new(vec![0.1, 0.2, 0.3]);

        let run = reporter.run(&dataset(&[0, 0, 0]), &scorer).expect("scoring succeeds");

        assert!(run.outcome(ArtifactKind::ConfusionMatrix).unwrap().is_success());
        assert!(run.outcome(ArtifactKind::ClassificationReport).unwrap().is_success());

        let metrics = run.metrics.as_ref().unwrap();
        assert_eq!(metrics.confusion_matrix.counts, vec![vec![3]]);

        let report = std::fs::read_to_string(tmp.path().join("classification_report.txt")).unwrap();
        let class_rows = report
            .lines()
            .filter(|l| l.trim_start().starts_with("0 "))
            .count();
        assert_eq!(class_rows, 1);
        assert!(!report.lines().any(|l| l.trim_start().starts_with("1 ")));

        // Curves are not special-cased for a single class.
        for kind in [ArtifactKind::RocCurve, ArtifactKind::PrecisionRecallCurve] {
            let outcome = run.outcome(kind).unwrap();
            assert!(matches!(
                outcome.result,
                Err(ReportError::Metrics(MetricsError::SingleClass { label: 0, .. }))
            ));
            assert!(!tmp.path().join(kind.file_name()).exists());
        }
    }

    #[test]
    fn test_failure_isolation() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the report file should go makes that write fail.
        std::fs::create_dir(tmp.path().join("classification_report.txt")).unwrap();

        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let scorer = PrecomputedScorer::new(vec![0.2, 0.7, 0.4, 0.9, 0.6, 0.1]);
        let run = reporter.run(&dataset(&[0, 1, 0, 1, 1, 0]), &scorer).unwrap();

        let failed: Vec<ArtifactKind> = run.failed().map(|a| a.kind).collect();
        assert_eq!(failed, vec![ArtifactKind::ClassificationReport]);
        assert!(matches!(
            run.outcome(ArtifactKind::ClassificationReport).unwrap().result,
            Err(ReportError::Io { .. })
        ));

        for kind in [
            ArtifactKind::ConfusionMatrix,
            ArtifactKind::RocCurve,
            ArtifactKind::PrecisionRecallCurve,
        ] {
            assert!(tmp.path().join(kind.file_name()).is_file());
        }
    }

    #[test]
    fn test_empty_dataset() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let empty = EvaluationDataset::new("empty", vec![]);

        let err = reporter.run(&empty, &KeywordScorer::new()).unwrap_err();
        assert!(matches!(err, ReportError::EmptyDataset));
        assert!(generate_evaluation_reports_and_plots(&empty, &KeywordScorer::new(), reporter.config()).is_none());
    }

    #[test]
    fn test_inference_failure_creates_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("eval");
        let reporter = EvaluationReporter::new(config_for(&out));
        let scorer = PrecomputedScorer::new(vec![0.5]);

        let err = reporter.run(&dataset(&[0, 1]), &scorer).unwrap_err();
        assert!(matches!(err, ReportError::Inference(InferenceError::LengthMismatch { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_precomputed_csv_with_skipped_row() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("scored.csv");
        std::fs::write(
            &input,
            "yo2,full_text,predicted_proba\n0,a,0.1\n,no label,0.7\n0,b,0.4\n1,c,0.6\n1,d,0.9\n",
        )
        .unwrap();

        let (data, probabilities) =
            EvaluationDataset::load_csv_with_probabilities(&input, "yo2", "full_text", "predicted_proba").unwrap();
        let out = tmp.path().join("eval");
        let reporter = EvaluationReporter::new(config_for(&out));
        let run = reporter.run(&data, &PrecomputedScorer::new(probabilities)).unwrap();

        assert!(run.all_succeeded());
        assert_all_files(&out);
        assert_eq!(run.scored.predicted_labels(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_summary_serializes() {
        let tmp = tempfile::tempdir().unwrap();
        let reporter = EvaluationReporter::new(config_for(tmp.path()));
        let scorer = PrecomputedScorer::new(vec![0.1, 0.4, 0.6, 0.9]);
        let run = reporter.run(&dataset(&[0, 0, 1, 1]), &scorer).unwrap();

        let summary = run.summary();
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.artifacts.len(), 4);
        assert!(summary.artifacts.iter().all(|a| a.ok && a.error.is_none()));

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"roc_curve\""));
        assert!(json.contains("precision_recall_curve.png"));
    }
}
