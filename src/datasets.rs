// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation input loading and the scored table produced by inference

use crate::error::InferenceError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Class label as stored in the label column (0/1 for binary tasks)
pub type ClassLabel = i64;

/// Probabilities at or above this value are predicted positive
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Map a probability to a binary label (inclusive at the threshold)
pub fn threshold_label(probability: f64) -> ClassLabel {
    if probability >= DECISION_THRESHOLD {
        1
    } else {
        0
    }
}

/// One labeled record of the evaluation input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// True class label
    pub label: ClassLabel,
    /// Raw text handed to the model
    pub text: String,
}

/// Labeled evaluation input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationDataset {
    pub name: String,
    pub records: Vec<Record>,
}

impl EvaluationDataset {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Build from parallel label and text columns
    pub fn from_columns(name: &str, labels: &[ClassLabel], texts: &[&str]) -> Result<Self> {
        if labels.len() != texts.len() {
            bail!(
                "Column length mismatch: {} labels, {} texts",
                labels.len(),
                texts.len()
            );
        }
        let records = labels
            .iter()
            .zip(texts.iter())
            .map(|(&label, text)| Record {
                label,
                text: text.to_string(),
            })
            .collect();
        Ok(Self::new(name, records))
    }

    /// Load a CSV file with a header row, reading the label and text columns
    pub fn load_csv(path: &Path, label_column: &str, text_column: &str) -> Result<Self> {
        let (records, _) = read_csv(path, label_column, text_column, None)?;
        Ok(Self::new(dataset_name(path), records))
    }

    /// Load labels, texts and a precomputed probability column in one pass.
    ///
    /// A row skipped for an unparseable label drops its probability too, so
    /// the returned vector stays aligned with the records.
    pub fn load_csv_with_probabilities(
        path: &Path,
        label_column: &str,
        text_column: &str,
        proba_column: &str,
    ) -> Result<(Self, Vec<f64>)> {
        let (records, probabilities) = read_csv(path, label_column, text_column, Some(proba_column))?;
        Ok((Self::new(dataset_name(path), records), probabilities))
    }

    /// Load a synthetic labeled dataset for development and testing
    pub fn load_synthetic(size: usize, seed: u64) -> Self {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let positive_phrases = [
            "BREAKING: Scientists confirm shocking discovery",
            "You won't believe what happened next",
            "The government doesn't want you to know",
            "This miracle cure doctors hate",
            "Secret conspiracy revealed exclusively",
        ];

        let negative_phrases = [
            "According to official reports",
            "Research published in peer-reviewed journal",
            "Statement from verified spokesperson",
            "Data analysis shows consistent trends",
            "Expert consensus indicates",
        ];

        let records = (0..size)
            .map(|i| {
                let positive = rng.gen_bool(0.5);
                let phrases = if positive { &positive_phrases } else { &negative_phrases };
                let phrase_idx = rng.gen_range(0..phrases.len());

                Record {
                    label: if positive { 1 } else { 0 },
                    text: format!("{} - sample content {}", phrases[phrase_idx], i),
                }
            })
            .collect();

        Self::new("synthetic", records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<ClassLabel> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.text.as_str()).collect()
    }

    /// Count of records per true label
    pub fn label_distribution(&self) -> BTreeMap<ClassLabel, usize> {
        let mut dist = BTreeMap::new();
        for record in &self.records {
            *dist.entry(record.label).or_insert(0) += 1;
        }
        dist
    }

    /// Attach predicted probabilities (aligned by position) and derive the
    /// thresholded labels
    pub fn with_probabilities(&self, probabilities: Vec<f64>) -> Result<ScoredDataset, InferenceError> {
        if probabilities.len() != self.records.len() {
            return Err(InferenceError::LengthMismatch {
                expected: self.records.len(),
                actual: probabilities.len(),
            });
        }

        let records = self
            .records
            .iter()
            .zip(probabilities)
            .map(|(record, predicted_proba)| ScoredRecord {
                label: record.label,
                text: record.text.clone(),
                predicted_proba,
                predicted_label: threshold_label(predicted_proba),
            })
            .collect();

        Ok(ScoredDataset {
            name: self.name.clone(),
            records,
        })
    }
}

/// A record with its predicted probability and thresholded label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub label: ClassLabel,
    pub text: String,
    pub predicted_proba: f64,
    pub predicted_label: ClassLabel,
}

/// Evaluation input with the inference columns attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDataset {
    pub name: String,
    pub records: Vec<ScoredRecord>,
}

impl ScoredDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn true_labels(&self) -> Vec<ClassLabel> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn predicted_labels(&self) -> Vec<ClassLabel> {
        self.records.iter().map(|r| r.predicted_label).collect()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.predicted_proba).collect()
    }

    /// Write the scored table as CSV, naming the columns after the input ones
    pub fn save_csv(&self, path: &Path, label_column: &str, text_column: &str) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let predicted_column = format!("predicted_{}", label_column);
        writer.write_record([label_column, text_column, "predicted_proba", predicted_column.as_str()])?;
        for record in &self.records {
            writer.write_record([
                record.label.to_string(),
                record.text.clone(),
                record.predicted_proba.to_string(),
                record.predicted_label.to_string(),
            ])?;
        }
        writer.flush()?;
        tracing::info!("Predictions saved to {}", path.display());
        Ok(())
    }
}

fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string())
}

/// Read records, plus the probability column when one is named
fn read_csv(
    path: &Path,
    label_column: &str,
    text_column: &str,
    proba_column: Option<&str>,
) -> Result<(Vec<Record>, Vec<f64>)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open dataset file: {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .clone();
    let label_idx = column_index(&headers, label_column, path)?;
    let text_idx = column_index(&headers, text_column, path)?;
    let proba_idx = proba_column
        .map(|column| column_index(&headers, column, path))
        .transpose()?;

    let mut records = Vec::new();
    let mut probabilities = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result
            .with_context(|| format!("Failed to read record {} in {}", idx, path.display()))?;

        let raw_label = record.get(label_idx).unwrap_or("");
        let Some(label) = parse_label(raw_label) else {
            tracing::warn!(
                "Skipping record {} in {}: unparseable label '{}'",
                idx,
                path.display(),
                raw_label
            );
            continue;
        };

        if let Some(proba_idx) = proba_idx {
            let raw = record.get(proba_idx).unwrap_or("").trim();
            let value: f64 = raw
                .parse()
                .with_context(|| format!("Invalid probability '{}' in record {} of {}", raw, idx, path.display()))?;
            probabilities.push(value);
        }

        let text = record.get(text_idx).unwrap_or("").to_string();
        records.push(Record { label, text });
    }

    tracing::info!("Loaded {} records from {}", records.len(), path.display());
    Ok((records, probabilities))
}

fn column_index(headers: &csv::StringRecord, column: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .with_context(|| format!("Column '{}' not found in {}", column, path.display()))
}

/// Parse a label cell: integers, or integral floats such as "1.0"
fn parse_label(raw: &str) -> Option<ClassLabel> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(threshold_label(0.5), 1);
        assert_eq!(threshold_label(0.4999), 0);
        assert_eq!(threshold_label(1.0), 1);
        assert_eq!(threshold_label(0.0), 0);
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("1"), Some(1));
        assert_eq!(parse_label(" 0 "), Some(0));
        assert_eq!(parse_label("1.0"), Some(1));
        assert_eq!(parse_label("0.5"), None);
        assert_eq!(parse_label("yes"), None);
    }

    #[test]
    fn test_with_probabilities() {
        let dataset = EvaluationDataset::from_columns(
            "tiny",
            &[0, 0, 1, 1],
            &["a", "b", "c", "d"],
        )
        .unwrap();
        let scored = dataset.with_probabilities(vec![0.1, 0.4, 0.6, 0.9]).unwrap();

        assert_eq!(scored.predicted_labels(), vec![0, 0, 1, 1]);
        assert_eq!(scored.true_labels(), vec![0, 0, 1, 1]);
        assert_eq!(scored.probabilities(), vec![0.1, 0.4, 0.6, 0.9]);
    }

    #[test]
    fn test_with_probabilities_length_mismatch() {
        let dataset = EvaluationDataset::from_columns("tiny", &[0, 1], &["a", "b"]).unwrap();
        let err = dataset.with_probabilities(vec![0.2]).unwrap_err();
        assert!(matches!(err, InferenceError::LengthMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,full_text,yo2").unwrap();
        writeln!(file, "1,\"first, with comma\",0").unwrap();
        writeln!(file, "2,second,1").unwrap();
        writeln!(file, "3,bad label,maybe").unwrap();
        writeln!(file, "4,fourth,1.0").unwrap();
        file.flush().unwrap();

        let dataset = EvaluationDataset::load_csv(file.path(), "yo2", "full_text").unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.labels(), vec![0, 1, 1]);
        assert_eq!(dataset.records[0].text, "first, with comma");
    }

    #[test]
    fn test_load_csv_missing_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "label,text").unwrap();
        writeln!(file, "0,hello").unwrap();
        file.flush().unwrap();

        let err = EvaluationDataset::load_csv(file.path(), "yo2", "full_text").unwrap_err();
        assert!(err.to_string().contains("yo2"));
    }

    #[test]
    fn test_load_csv_with_probabilities() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "yo2,full_text,predicted_proba").unwrap();
        writeln!(file, "0,a,0.25").unwrap();
        writeln!(file, ",missing label,0.9").unwrap();
        writeln!(file, "1,b,0.75").unwrap();
        writeln!(file, "1,c,0.6").unwrap();
        writeln!(file, "0,d,0.1").unwrap();
        file.flush().unwrap();

        let (dataset, probs) =
            EvaluationDataset::load_csv_with_probabilities(file.path(), "yo2", "full_text", "predicted_proba")
                .unwrap();
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.labels(), vec![0, 1, 1, 0]);
        assert_eq!(probs, vec![0.25, 0.75, 0.6, 0.1]);

        // The skipped row must not shift the remaining probabilities.
        let scored = dataset.with_probabilities(probs).unwrap();
        assert_eq!(scored.records[1].text, "b");
        assert_eq!(scored.records[1].predicted_proba, 0.75);
    }

    #[test]
    fn test_load_csv_with_probabilities_rejects_bad_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "yo2,full_text,predicted_proba").unwrap();
        writeln!(file, "0,a,high").unwrap();
        file.flush().unwrap();

        let err = EvaluationDataset::load_csv_with_probabilities(file.path(), "yo2", "full_text", "predicted_proba")
            .unwrap_err();
        assert!(err.to_string().contains("high"));
    }

    #[test]
    fn test_synthetic_dataset() {
        let dataset = EvaluationDataset::load_synthetic(100, 42);
        assert_eq!(dataset.len(), 100);

        let dist = dataset.label_distribution();
        assert_eq!(dist.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(dist.values().sum::<usize>(), 100);
    }

    #[test]
    fn test_save_csv_roundtrip_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let dataset = EvaluationDataset::from_columns("tiny", &[0, 1], &["a", "b"]).unwrap();
        let scored = dataset.with_probabilities(vec![0.3, 0.5]).unwrap();
        scored.save_csv(&path, "yo2", "full_text").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("yo2,full_text,predicted_proba,predicted_yo2"));
        assert!(content.contains("b,0.5,1"));
    }
}
