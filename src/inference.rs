// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Inference seam: anything that maps texts to positive-class probabilities
//!
//! The reporter only needs `ProbabilityScorer::predict_proba`. Implementations
//! provide `score_batch`; batching, truncation, progress reporting and output
//! validation are shared.
//!
//! Two scorers ship with the crate:
//! - `KeywordScorer`: lexical heuristic, useful for smoke tests and demos
//! - `PrecomputedScorer`: replays probabilities computed elsewhere

use crate::config::InferenceConfig;
use crate::error::InferenceError;
use indicatif::{ProgressBar, ProgressStyle};

/// An inference capability producing P(label = 1) for each text
pub trait ProbabilityScorer {
    /// Score one batch of already-truncated texts, in order
    fn score_batch(&self, texts: &[&str], config: &InferenceConfig) -> Result<Vec<f64>, InferenceError>;

    /// Scorer name, used in logs and errors
    fn name(&self) -> &str;

    /// Score every text, batched per `config.batch_size`
    fn predict_proba(&self, texts: &[&str], config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
        score_in_batches(self, texts, config)
    }
}

/// Shared body of `predict_proba`: truncate, batch, report progress, validate
fn score_in_batches<S>(scorer: &S, texts: &[&str], config: &InferenceConfig) -> Result<Vec<f64>, InferenceError>
where
    S: ProbabilityScorer + ?Sized,
{
    let batch_size = config.batch_size.max(1);
    tracing::info!(
        "Scoring {} texts with '{}' (batch_size={}, device={})",
        texts.len(),
        scorer.name(),
        batch_size,
        config.device
    );

    let progress = if config.show_progress {
        let bar = ProgressBar::new(texts.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut probabilities = Vec::with_capacity(texts.len());
    for (batch_idx, chunk) in texts.chunks(batch_size).enumerate() {
        let truncated: Vec<&str> = chunk
            .iter()
            .map(|text| truncate_tokens(text, config.max_seq_length))
            .collect();

        let scores = match scorer.score_batch(&truncated, config) {
            Ok(scores) => scores,
            Err(e) => {
                progress.abandon();
                return Err(InferenceError::Batch {
                    scorer: scorer.name().to_string(),
                    batch: batch_idx,
                    message: e.to_string(),
                });
            }
        };
        if scores.len() != chunk.len() {
            progress.abandon();
            return Err(InferenceError::LengthMismatch {
                expected: chunk.len(),
                actual: scores.len(),
            });
        }

        tracing::debug!("Batch {} scored ({} texts)", batch_idx, chunk.len());
        probabilities.extend(scores);
        progress.inc(chunk.len() as u64);
    }
    progress.finish_and_clear();

    validate_probabilities(&probabilities)?;
    Ok(probabilities)
}

/// Keep at most `max_tokens` whitespace-separated tokens of `text`
pub fn truncate_tokens(text: &str, max_tokens: usize) -> &str {
    if max_tokens == 0 {
        return "";
    }
    match text.split_whitespace().nth(max_tokens) {
        // Cut just before the first token beyond the limit.
        Some(first_dropped) => {
            let offset = first_dropped.as_ptr() as usize - text.as_ptr() as usize;
            text[..offset].trim_end()
        }
        None => text,
    }
}

fn validate_probabilities(probabilities: &[f64]) -> Result<(), InferenceError> {
    match probabilities
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        Some((index, &value)) => Err(InferenceError::OutOfRange { index, value }),
        None => Ok(()),
    }
}

/// Lexical scorer: sigmoid over weighted keyword matches
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    /// Keywords pushing the score toward the positive class
    positive_keywords: Vec<String>,
    /// Keywords pushing the score toward the negative class
    negative_keywords: Vec<String>,
    /// Weight per keyword match
    keyword_weight: f64,
}

impl KeywordScorer {
    pub fn new() -> Self {
        let positive = [
            // Sensationalism
            "breaking", "shocking", "unbelievable", "urgent", "exclusive",
            // Conspiracy language
            "conspiracy", "coverup", "secret", "hidden", "exposed",
            // Manipulative
            "miracle", "cure", "doctors hate", "won't believe",
            "doesn't want you to know",
        ];
        let negative = [
            // Attribution
            "according to", "study shows", "research", "peer-reviewed", "published",
            // Sourcing
            "official", "spokesperson", "confirmed", "verified",
            // Nuance
            "however", "experts say", "evidence suggests", "consensus", "analysis",
        ];

        Self::with_keywords(&positive, &negative, 0.1)
    }

    pub fn with_keywords(positive: &[&str], negative: &[&str], keyword_weight: f64) -> Self {
        Self {
            positive_keywords: positive.iter().map(|k| k.to_lowercase()).collect(),
            negative_keywords: negative.iter().map(|k| k.to_lowercase()).collect(),
            keyword_weight,
        }
    }

    /// Probability for one text
    pub fn score(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let count = |keywords: &[String]| keywords.iter().filter(|kw| text_lower.contains(kw.as_str())).count();

        let positive_score = count(&self.positive_keywords) as f64 * self.keyword_weight;
        let negative_score = count(&self.negative_keywords) as f64 * self.keyword_weight;

        // Scaled sigmoid
        let diff = positive_score - negative_score;
        1.0 / (1.0 + (-diff * 5.0).exp())
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbabilityScorer for KeywordScorer {
    fn score_batch(&self, texts: &[&str], _config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
        Ok(texts.iter().map(|t| self.score(t)).collect())
    }

    fn name(&self) -> &str {
        "Keyword"
    }
}

/// Replays probabilities computed elsewhere, aligned by position
#[derive(Debug, Clone)]
pub struct PrecomputedScorer {
    probabilities: Vec<f64>,
    cursor: std::cell::Cell<usize>,
}

impl PrecomputedScorer {
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self {
            probabilities,
            cursor: std::cell::Cell::new(0),
        }
    }
}

impl ProbabilityScorer for PrecomputedScorer {
    fn score_batch(&self, texts: &[&str], _config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
        let start = self.cursor.get();
        let end = start + texts.len();
        let Some(batch) = self.probabilities.get(start..end) else {
            return Err(InferenceError::LengthMismatch {
                expected: end,
                actual: self.probabilities.len(),
            });
        };
        self.cursor.set(end);
        Ok(batch.to_vec())
    }

    fn predict_proba(&self, texts: &[&str], config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
        if texts.len() != self.probabilities.len() {
            return Err(InferenceError::LengthMismatch {
                expected: texts.len(),
                actual: self.probabilities.len(),
            });
        }
        self.cursor.set(0);
        let config = InferenceConfig {
            show_progress: false,
            ..config.clone()
        };
        score_in_batches(self, texts, &config)
    }

    fn name(&self) -> &str {
        "Precomputed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config(batch_size: usize) -> InferenceConfig {
        InferenceConfig {
            batch_size,
            show_progress: false,
            ..InferenceConfig::default()
        }
    }

    /// Records the size of every batch it receives
    struct RecordingScorer {
        batches: std::cell::RefCell<Vec<Vec<String>>>,
    }

    impl ProbabilityScorer for RecordingScorer {
        fn score_batch(&self, texts: &[&str], _config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
            self.batches
                .borrow_mut()
                .push(texts.iter().map(|t| t.to_string()).collect());
            Ok(vec![0.5; texts.len()])
        }

        fn name(&self) -> &str {
            "Recording"
        }
    }

    /// Fails on every batch after the first
    struct FailingScorer {
        calls: std::cell::Cell<usize>,
    }

    impl ProbabilityScorer for FailingScorer {
        fn score_batch(&self, texts: &[&str], _config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call > 0 {
                return Err(InferenceError::InvalidDevice("cuda:7".to_string()));
            }
            Ok(vec![0.5; texts.len()])
        }

        fn name(&self) -> &str {
            "Failing"
        }
    }

    struct BrokenScorer;

    impl ProbabilityScorer for BrokenScorer {
        fn score_batch(&self, texts: &[&str], _config: &InferenceConfig) -> Result<Vec<f64>, InferenceError> {
            Ok(vec![1.5; texts.len()])
        }

        fn name(&self) -> &str {
            "Broken"
        }
    }

    #[test]
    fn test_batching() {
        let scorer = RecordingScorer {
            batches: Default::default(),
        };
        let texts = ["a", "b", "c", "d", "e"];
        let probs = scorer.predict_proba(&texts, &quiet_config(2)).unwrap();

        assert_eq!(probs.len(), 5);
        let sizes: Vec<usize> = scorer.batches.borrow().iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_truncation_applied_before_scoring() {
        let scorer = RecordingScorer {
            batches: Default::default(),
        };
        let config = InferenceConfig {
            max_seq_length: 2,
            ..quiet_config(8)
        };
        scorer.predict_proba(&["one two three four"], &config).unwrap();
        assert_eq!(scorer.batches.borrow()[0], vec!["one two".to_string()]);
    }

    #[test]
    fn test_truncate_tokens() {
        assert_eq!(truncate_tokens("a b c", 5), "a b c");
        assert_eq!(truncate_tokens("a  b   c d", 2), "a  b");
        assert_eq!(truncate_tokens("  lead trail  ", 1), "  lead");
        assert_eq!(truncate_tokens("anything", 0), "");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = BrokenScorer.predict_proba(&["x"], &quiet_config(4)).unwrap_err();
        assert!(matches!(err, InferenceError::OutOfRange { index: 0, .. }));
    }

    #[test]
    fn test_batch_failure_names_scorer_and_batch() {
        let scorer = FailingScorer {
            calls: Default::default(),
        };
        let err = scorer.predict_proba(&["a", "b", "c"], &quiet_config(2)).unwrap_err();

        match err {
            InferenceError::Batch { scorer, batch, message } => {
                assert_eq!(scorer, "Failing");
                assert_eq!(batch, 1);
                assert!(message.contains("cuda:7"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_precomputed_scorer_truncation_irrelevant() {
        let scorer = PrecomputedScorer::new(vec![0.2, 0.8]);
        let config = InferenceConfig {
            max_seq_length: 1,
            show_progress: true,
            ..quiet_config(1)
        };
        let probs = scorer.predict_proba(&["long text here", "b"], &config).unwrap();
        assert_eq!(probs, vec![0.2, 0.8]);
    }

    #[test]
    fn test_precomputed_scorer_rejects_out_of_range() {
        let scorer = PrecomputedScorer::new(vec![0.2, 1.2]);
        let err = scorer.predict_proba(&["a", "b"], &quiet_config(2)).unwrap_err();
        assert!(matches!(err, InferenceError::OutOfRange { index: 1, .. }));
    }

    #[test]
    fn test_keyword_scorer() {
        let scorer = KeywordScorer::new();
        let positive = scorer.score("BREAKING: Shocking new discovery scientists don't want you to know");
        let negative = scorer.score("According to a peer-reviewed study published in Nature");

        assert!(positive > 0.5);
        assert!(negative < 0.5);
        assert!((scorer.score("neutral words only") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_precomputed_scorer() {
        let scorer = PrecomputedScorer::new(vec![0.1, 0.9, 0.4]);
        let probs = scorer.predict_proba(&["a", "b", "c"], &quiet_config(2)).unwrap();
        assert_eq!(probs, vec![0.1, 0.9, 0.4]);

        // Reusable across runs
        let again = scorer.predict_proba(&["a", "b", "c"], &quiet_config(1)).unwrap();
        assert_eq!(again, probs);
    }

    #[test]
    fn test_precomputed_scorer_length_mismatch() {
        let scorer = PrecomputedScorer::new(vec![0.1]);
        let err = scorer.predict_proba(&["a", "b"], &quiet_config(2)).unwrap_err();
        assert!(matches!(err, InferenceError::LengthMismatch { expected: 2, actual: 1 }));
    }
}
