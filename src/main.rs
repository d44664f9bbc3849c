// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation report CLI for binary text classifiers
//!
//! Usage:
//!   eval-report --input data.csv --scorer keyword
//!   eval-report --input scored.csv --scorer precomputed --proba-column predicted_proba
//!   eval-report --synthetic 500 --seed 42 --output ./evaluation_results

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use classifier_eval::{
    generate_evaluation_reports_and_plots, Config, EvaluationDataset, KeywordScorer, PrecomputedScorer,
    ProbabilityScorer,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScorerKind {
    /// Lexical keyword heuristic
    Keyword,
    /// Probabilities read from a column of the input file
    Precomputed,
}

#[derive(Parser, Debug)]
#[command(name = "eval-report")]
#[command(about = "Generate evaluation reports and plots for a binary classifier")]
#[command(version)]
struct Args {
    /// Labeled CSV file to evaluate
    #[arg(short, long, conflicts_with = "synthetic")]
    input: Option<PathBuf>,

    /// Generate a synthetic dataset of this size instead of reading a file
    #[arg(long)]
    synthetic: Option<usize>,

    /// Random seed for the synthetic dataset
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Label column name (overrides the config file)
    #[arg(long)]
    label_column: Option<String>,

    /// Text column name (overrides the config file)
    #[arg(long)]
    text_column: Option<String>,

    /// Where predicted probabilities come from
    #[arg(long, value_enum, default_value_t = ScorerKind::Keyword)]
    scorer: ScorerKind,

    /// Probability column for the precomputed scorer
    #[arg(long, default_value = "predicted_proba")]
    proba_column: String,

    /// Write the run summary as JSON to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write the scored dataset as CSV to this file
    #[arg(long)]
    predictions: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(output) = args.output {
        config.evaluation.output_dir = output;
    }
    if let Some(label_column) = args.label_column {
        config.evaluation.label_column = label_column;
    }
    if let Some(text_column) = args.text_column {
        config.evaluation.text_column = text_column;
    }

    let label_column = &config.evaluation.label_column;
    let text_column = &config.evaluation.text_column;
    let (dataset, scorer): (EvaluationDataset, Box<dyn ProbabilityScorer>) = match (&args.input, args.scorer) {
        (Some(path), ScorerKind::Keyword) => (
            EvaluationDataset::load_csv(path, label_column, text_column)?,
            Box::new(KeywordScorer::new()) as Box<dyn ProbabilityScorer>,
        ),
        (Some(path), ScorerKind::Precomputed) => {
            // Same pass as the labels, so skipped rows stay aligned
            let (dataset, probabilities) =
                EvaluationDataset::load_csv_with_probabilities(path, label_column, text_column, &args.proba_column)?;
            (dataset, Box::new(PrecomputedScorer::new(probabilities)) as Box<dyn ProbabilityScorer>)
        }
        (None, ScorerKind::Precomputed) => {
            bail!("--scorer precomputed needs --input with a '{}' column", args.proba_column)
        }
        (None, ScorerKind::Keyword) => match args.synthetic {
            Some(size) => (
                EvaluationDataset::load_synthetic(size, args.seed),
                Box::new(KeywordScorer::new()) as Box<dyn ProbabilityScorer>,
            ),
            None => bail!("either --input or --synthetic is required"),
        },
    };

    tracing::info!("Binary Classifier Evaluation Report");
    tracing::info!("===================================");
    tracing::info!("Dataset: {} ({} samples)", dataset.name, dataset.len());
    tracing::info!("Label distribution: {:?}", dataset.label_distribution());
    tracing::info!("Output: {}", config.evaluation.output_dir.display());

    let Some(run) = generate_evaluation_reports_and_plots(&dataset, scorer.as_ref(), &config) else {
        println!("\nNo evaluation artifacts were generated; see the log for details.");
        return Ok(());
    };
    let summary = run.summary();

    // Print summary to console
    let fmt_opt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.4}", v));
    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("\nDataset: {} ({} samples)", summary.dataset, summary.samples);
    println!("{:-<70}", "");
    println!("{:<12} {:>10} {:>10} {:>10} {:>10} {:>10}", "", "Accuracy", "MCC", "AUC-ROC", "Avg Prec", "Brier");
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>10}",
        scorer.name(),
        fmt_opt(summary.accuracy),
        fmt_opt(summary.mcc),
        fmt_opt(summary.auc_roc),
        fmt_opt(summary.average_precision),
        fmt_opt(summary.brier_score)
    );
    println!("{:-<70}", "");

    println!("\nArtifacts:");
    println!("{:-<70}", "");
    for artifact in &summary.artifacts {
        let status = if artifact.ok { "OK" } else { "FAILED" };
        println!("{:<32} {:>8}", artifact.file, status);
        if let Some(ref error) = artifact.error {
            println!("    {}", error);
        }
    }
    println!("{:-<70}", "");

    if let Some(metrics) = &run.metrics {
        println!("\n{}", metrics.format());
    }

    if let Some(path) = &args.predictions {
        run.scored
            .save_csv(path, &config.evaluation.label_column, &config.evaluation.text_column)?;
        println!("Predictions saved to: {}", path.display());
    }

    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Summary saved to: {}", path.display());
    }

    println!("\nEvaluation complete!");

    Ok(())
}
