// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for binary (and label-indexed) classification
//!
//! Implements:
//! - Confusion matrix over the observed label set
//! - Per-class precision, recall, F1 and support (classification report)
//! - ROC curve and AUC
//! - Precision-recall curve and average precision
//! - Brier score and Matthews Correlation Coefficient (MCC)

use crate::datasets::ClassLabel;
use crate::error::MetricsError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Labels a matrix or report is computed over, with their display names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub labels: Vec<ClassLabel>,
    pub display_names: Vec<String>,
}

impl LabelSet {
    /// Sorted union of the labels seen in `y_true` and `y_pred`.
    ///
    /// When only one distinct value is present the set is pinned to that
    /// single label, so the matrix comes out 1x1 instead of assuming two
    /// classes.
    pub fn observed(y_true: &[ClassLabel], y_pred: &[ClassLabel]) -> Self {
        let unique: BTreeSet<ClassLabel> = y_true.iter().chain(y_pred.iter()).copied().collect();

        if unique.len() == 1 {
            let only = *unique.iter().next().unwrap_or(&0);
            tracing::debug!("Single class ({}) present; using explicit label list", only);
            return Self::explicit(vec![only]);
        }

        Self::explicit(unique.into_iter().collect())
    }

    pub fn explicit(labels: Vec<ClassLabel>) -> Self {
        let display_names = labels.iter().map(|l| l.to_string()).collect();
        Self { labels, display_names }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn index_of(&self, label: ClassLabel) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }
}

/// Contingency table: rows are true labels, columns are predicted labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: LabelSet,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Compute over the observed label set
    pub fn from_predictions(y_true: &[ClassLabel], y_pred: &[ClassLabel]) -> Result<Self, MetricsError> {
        check_lengths(y_true.len(), y_pred.len())?;
        let labels = LabelSet::observed(y_true, y_pred);
        Self::with_labels(y_true, y_pred, labels)
    }

    /// Compute over an explicit label set; pairs with a label outside the
    /// set are ignored
    pub fn with_labels(y_true: &[ClassLabel], y_pred: &[ClassLabel], labels: LabelSet) -> Result<Self, MetricsError> {
        check_lengths(y_true.len(), y_pred.len())?;

        let n = labels.len();
        let mut counts = vec![vec![0usize; n]; n];
        for (&truth, &pred) in y_true.iter().zip(y_pred.iter()) {
            if let (Some(i), Some(j)) = (labels.index_of(truth), labels.index_of(pred)) {
                counts[i][j] += 1;
            }
        }

        Ok(Self { labels, counts })
    }

    /// Number of classes (matrix side length)
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    /// Total number of counted samples
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Samples whose true label is class `i`
    pub fn row_total(&self, i: usize) -> usize {
        self.counts[i].iter().sum()
    }

    /// Samples predicted as class `j`
    pub fn col_total(&self, j: usize) -> usize {
        self.counts.iter().map(|row| row[j]).sum()
    }

    /// Largest single cell, used to scale the heatmap
    pub fn max_count(&self) -> usize {
        self.counts.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Accuracy: trace / total
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.size()).map(|i| self.counts[i][i]).sum();
        ratio(correct, self.total())
    }

    /// Precision of class `i`: TP / predicted as `i`
    pub fn precision(&self, i: usize) -> f64 {
        ratio(self.counts[i][i], self.col_total(i))
    }

    /// Recall of class `i`: TP / actually `i`
    pub fn recall(&self, i: usize) -> f64 {
        ratio(self.counts[i][i], self.row_total(i))
    }

    /// F1 of class `i`
    pub fn f1_score(&self, i: usize) -> f64 {
        harmonic_mean(self.precision(i), self.recall(i))
    }

    /// TP/TN/FP/FN with label 1 as the positive class, when the matrix is
    /// exactly over {0, 1}
    pub fn binary_counts(&self) -> Option<BinaryCounts> {
        if self.labels.labels != [0, 1] {
            return None;
        }
        Some(BinaryCounts {
            tn: self.counts[0][0],
            fp: self.counts[0][1],
            fn_: self.counts[1][0],
            tp: self.counts[1][1],
        })
    }
}

/// Positive-class view of a 2x2 confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryCounts {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl BinaryCounts {
    /// Specificity: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// Sensitivity: TP / (TP + FN)
    pub fn sensitivity(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// Balanced Accuracy: (Sensitivity + Specificity) / 2
    pub fn balanced_accuracy(&self) -> f64 {
        (self.sensitivity() + self.specificity()) / 2.0
    }

    /// Matthews Correlation Coefficient, in [-1, 1]
    pub fn mcc(&self) -> f64 {
        let tp = self.tp as f64;
        let tn = self.tn as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let numerator = tp * tn - fp * fn_;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        if denominator == 0.0 {
            return 0.0;
        }
        numerator / denominator
    }
}

/// Precision, recall, F1 and support for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged precision, recall and F1 over classes
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Per-class report with accuracy, macro and weighted averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub support: usize,
}

impl ClassificationReport {
    /// Generate report from a confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        let classes: Vec<ClassMetrics> = (0..cm.size())
            .map(|i| ClassMetrics {
                name: cm.labels.display_names[i].clone(),
                precision: cm.precision(i),
                recall: cm.recall(i),
                f1_score: cm.f1_score(i),
                support: cm.row_total(i),
            })
            .collect();

        let support: usize = classes.iter().map(|c| c.support).sum();
        let n = classes.len().max(1) as f64;

        let macro_avg = AverageMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / n,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                return 0.0;
            }
            classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / support as f64
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1_score: weighted(|c| c.f1_score),
        };

        Self {
            accuracy: cm.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            support,
        }
    }

    /// Generate report from predictions and ground truth
    pub fn from_predictions(y_true: &[ClassLabel], y_pred: &[ClassLabel]) -> Result<Self, MetricsError> {
        let cm = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        Ok(Self::from_confusion_matrix(&cm))
    }

    /// Fixed-width text table, two decimal places
    pub fn format(&self) -> String {
        const HEADERS: [&str; 4] = ["precision", "recall", "f1-score", "support"];
        const AVG_LABELS: [&str; 2] = ["macro avg", "weighted avg"];

        let width = self
            .classes
            .iter()
            .map(|c| c.name.chars().count())
            .chain(AVG_LABELS.iter().map(|l| l.len()))
            .max()
            .unwrap_or(0);

        let mut report = format!("{:>width$} ", "", width = width);
        for header in HEADERS {
            report.push_str(&format!(" {:>9}", header));
        }
        report.push_str("\n\n");

        for class in &self.classes {
            report.push_str(&format_row(&class.name, class.precision, class.recall, class.f1_score, class.support, width));
        }
        report.push('\n');

        report.push_str(&format!(
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support,
            width = width
        ));

        for (label, avg) in AVG_LABELS.iter().zip([self.macro_avg, self.weighted_avg]) {
            report.push_str(&format_row(label, avg.precision, avg.recall, avg.f1_score, self.support, width));
        }

        report
    }
}

fn format_row(name: &str, precision: f64, recall: f64, f1: f64, support: usize, width: usize) -> String {
    format!(
        "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
        name,
        precision,
        recall,
        f1,
        support,
        width = width
    )
}

/// ROC curve points and area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// False positive rates, non-decreasing from 0 to 1
    pub fpr: Vec<f64>,
    /// True positive rates, non-decreasing from 0 to 1
    pub tpr: Vec<f64>,
    /// Decision threshold for each point; the first is +inf
    #[serde(skip)]
    pub thresholds: Vec<f64>,
    /// Area under the curve (trapezoidal rule)
    pub auc: f64,
}

/// Compute the ROC curve with label 1 as the positive class.
///
/// One point per distinct score (descending), collinear intermediate points
/// dropped, starting from (0, 0).
pub fn roc_curve(y_true: &[ClassLabel], scores: &[f64]) -> Result<RocCurve, MetricsError> {
    let curve = binary_clf_curve(y_true, scores, "ROC curve")?;
    let (mut fps, mut tps, mut thresholds) = (curve.fps, curve.tps, curve.thresholds);

    if fps.len() > 2 {
        let keep: Vec<usize> = (0..fps.len())
            .filter(|&i| {
                i == 0
                    || i == fps.len() - 1
                    || second_diff(&fps, i) != 0.0
                    || second_diff(&tps, i) != 0.0
            })
            .collect();
        fps = keep.iter().map(|&i| fps[i]).collect();
        tps = keep.iter().map(|&i| tps[i]).collect();
        thresholds = keep.iter().map(|&i| thresholds[i]).collect();
    }

    fps.insert(0, 0.0);
    tps.insert(0, 0.0);
    thresholds.insert(0, f64::INFINITY);

    let total_neg = fps.last().copied().unwrap_or(0.0);
    let total_pos = tps.last().copied().unwrap_or(0.0);
    let fpr: Vec<f64> = fps.iter().map(|fp| fp / total_neg).collect();
    let tpr: Vec<f64> = tps.iter().map(|tp| tp / total_pos).collect();
    let auc = auc(&fpr, &tpr);

    Ok(RocCurve {
        fpr,
        tpr,
        thresholds,
        auc,
    })
}

/// ROC AUC only
pub fn roc_auc_score(y_true: &[ClassLabel], scores: &[f64]) -> Result<f64, MetricsError> {
    Ok(roc_curve(y_true, scores)?.auc)
}

/// Precision-recall curve points and average precision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallCurve {
    /// Precision per point, ending with 1.0
    pub precision: Vec<f64>,
    /// Recall per point, non-increasing, ending with 0.0
    pub recall: Vec<f64>,
    /// Thresholds in increasing order (one fewer than the points)
    #[serde(skip)]
    pub thresholds: Vec<f64>,
    pub average_precision: f64,
}

/// Compute precision/recall pairs for every distinct threshold, plus the
/// terminal point (recall 0, precision 1).
pub fn precision_recall_curve(y_true: &[ClassLabel], scores: &[f64]) -> Result<PrecisionRecallCurve, MetricsError> {
    let curve = binary_clf_curve(y_true, scores, "precision-recall curve")?;
    let total_pos = curve.tps.last().copied().unwrap_or(0.0);

    let precision_desc: Vec<f64> = curve
        .tps
        .iter()
        .zip(curve.fps.iter())
        .map(|(tp, fp)| tp / (tp + fp))
        .collect();
    let recall_desc: Vec<f64> = curve.tps.iter().map(|tp| tp / total_pos).collect();
    let average_precision = step_average_precision(&precision_desc, &recall_desc);

    let mut precision: Vec<f64> = precision_desc.into_iter().rev().collect();
    let mut recall: Vec<f64> = recall_desc.into_iter().rev().collect();
    precision.push(1.0);
    recall.push(0.0);
    let thresholds = curve.thresholds.into_iter().rev().collect();

    Ok(PrecisionRecallCurve {
        precision,
        recall,
        thresholds,
        average_precision,
    })
}

/// Average precision: sum over thresholds of (R_k - R_{k-1}) * P_k
pub fn average_precision_score(y_true: &[ClassLabel], scores: &[f64]) -> Result<f64, MetricsError> {
    Ok(precision_recall_curve(y_true, scores)?.average_precision)
}

/// Brier score (lower is better); labels must be 0/1
pub fn brier_score(y_true: &[ClassLabel], probabilities: &[f64]) -> Result<f64, MetricsError> {
    if y_true.is_empty() {
        return Err(MetricsError::EmptyInput);
    }
    check_lengths(y_true.len(), probabilities.len())?;
    check_binary(y_true, "Brier score")?;

    let sum: f64 = y_true
        .iter()
        .zip(probabilities.iter())
        .map(|(&label, p)| (p - label as f64).powi(2))
        .sum();
    Ok(sum / y_true.len() as f64)
}

/// Trapezoidal area under (x, y)
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum::<f64>()
        .abs()
}

/// Cumulative counts at each distinct threshold, highest score first
struct ClfCurve {
    fps: Vec<f64>,
    tps: Vec<f64>,
    thresholds: Vec<f64>,
}

fn binary_clf_curve(y_true: &[ClassLabel], scores: &[f64], metric: &'static str) -> Result<ClfCurve, MetricsError> {
    if y_true.is_empty() {
        return Err(MetricsError::EmptyInput);
    }
    check_lengths(y_true.len(), scores.len())?;
    if let Some((index, &value)) = scores.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(MetricsError::NonFiniteScore { index, value });
    }
    check_binary(y_true, metric)?;

    let positives = y_true.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == y_true.len() {
        return Err(MetricsError::SingleClass {
            label: y_true[0],
            metric,
        });
    }

    // Stable sort keeps input order among tied scores.
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let mut thresholds = Vec::new();
    let (mut tp, mut fp) = (0usize, 0usize);

    for (pos, &idx) in order.iter().enumerate() {
        if y_true[idx] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_run = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_run {
            fps.push(fp as f64);
            tps.push(tp as f64);
            thresholds.push(scores[idx]);
        }
    }

    Ok(ClfCurve { fps, tps, thresholds })
}

/// Step-wise AP over points ordered by descending threshold
fn step_average_precision(precision: &[f64], recall: &[f64]) -> f64 {
    let mut ap = 0.0;
    let mut prev_recall = 0.0;
    for (p, r) in precision.iter().zip(recall.iter()) {
        ap += (r - prev_recall) * p;
        prev_recall = *r;
    }
    ap
}

fn second_diff(values: &[f64], i: usize) -> f64 {
    values[i + 1] - 2.0 * values[i] + values[i - 1]
}

fn check_lengths(expected: usize, actual: usize) -> Result<(), MetricsError> {
    if expected != actual {
        return Err(MetricsError::LengthMismatch { expected, actual });
    }
    Ok(())
}

fn check_binary(y_true: &[ClassLabel], metric: &'static str) -> Result<(), MetricsError> {
    match y_true.iter().find(|&&l| l != 0 && l != 1) {
        Some(&label) => Err(MetricsError::NonBinaryLabel { label, metric }),
        None => Ok(()),
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        return 0.0;
    }
    2.0 * a * b / (a + b)
}

/// Summary of a scored dataset: threshold metrics plus probabilistic ones
/// where they are defined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub confusion_matrix: ConfusionMatrix,
    pub classification: ClassificationReport,
    /// Positive-class counts and MCC (binary label sets only)
    pub binary: Option<BinaryCounts>,
    pub mcc: Option<f64>,
    /// AUC-ROC (None when undefined, e.g. a single class)
    pub auc_roc: Option<f64>,
    /// Average precision (area under PR curve)
    pub average_precision: Option<f64>,
    /// Brier score (calibration metric)
    pub brier_score: Option<f64>,
    pub support: usize,
}

impl EvaluationMetrics {
    /// Compute from true labels, thresholded predictions and probabilities
    pub fn from_predictions_with_probs(
        y_true: &[ClassLabel],
        y_pred: &[ClassLabel],
        probabilities: &[f64],
    ) -> Result<Self, MetricsError> {
        let confusion_matrix = ConfusionMatrix::from_predictions(y_true, y_pred)?;
        let classification = ClassificationReport::from_confusion_matrix(&confusion_matrix);
        let binary = confusion_matrix.binary_counts();

        let auc_roc = roc_auc_score(y_true, probabilities)
            .map_err(|e| tracing::debug!("AUC-ROC unavailable: {}", e))
            .ok();
        let average_precision = average_precision_score(y_true, probabilities)
            .map_err(|e| tracing::debug!("Average precision unavailable: {}", e))
            .ok();
        let brier_score = brier_score(y_true, probabilities).ok();

        Ok(Self {
            support: confusion_matrix.total(),
            mcc: binary.map(|b| b.mcc()),
            binary,
            confusion_matrix,
            classification,
            auc_roc,
            average_precision,
            brier_score,
        })
    }

    /// Format as human-readable string
    pub fn format(&self) -> String {
        let mut output = self.classification.format();

        if let Some(mcc) = self.mcc {
            output.push_str(&format!("\nMCC:               {:.4}\n", mcc));
        }
        if let Some(auc) = self.auc_roc {
            output.push_str(&format!("AUC-ROC:           {:.4}\n", auc));
        }
        if let Some(ap) = self.average_precision {
            output.push_str(&format!("Average Precision: {:.4}\n", ap));
        }
        if let Some(brier) = self.brier_score {
            output.push_str(&format!("Brier Score:       {:.4}\n", brier));
        }

        output
    }
}
