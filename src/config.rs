// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reporter configuration, loaded from TOML

use crate::error::InferenceError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Complete reporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub evaluation: EvaluationSection,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub plot: PlotConfig,
}

/// Where artifacts go and which dataset columns to read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSection {
    /// Output directory for reports and plots
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Column holding the true 0/1 label
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// Column holding the raw text
    #[serde(default = "default_text_column")]
    pub text_column: String,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            label_column: default_label_column(),
            text_column: default_text_column(),
        }
    }
}

/// Parameters handed to the inference capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Number of texts per scoring call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of whitespace tokens kept per text
    #[serde(default = "default_max_seq_length")]
    pub max_seq_length: usize,
    /// Execution device for the model
    #[serde(default)]
    pub device: Device,
    /// Show a progress bar while scoring
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_seq_length: default_max_seq_length(),
            device: Device::default(),
            show_progress: true,
        }
    }
}

/// Plot rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// TrueType font used for titles and labels. When unset, a few common
    /// system locations are searched.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            font_path: None,
        }
    }
}

/// Execution device for inference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl std::str::FromStr for Device {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| InferenceError::InvalidDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = InferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(n) => write!(f, "cuda:{}", n),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("evaluation_results")
}

fn default_label_column() -> String {
    "yo2".to_string()
}

fn default_text_column() -> String {
    "full_text".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_seq_length() -> usize {
    512
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Config with the given output directory and defaults elsewhere
    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.evaluation.output_dir = output_dir.into();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.evaluation.label_column, "yo2");
        assert_eq!(config.evaluation.text_column, "full_text");
        assert_eq!(config.inference.batch_size, 32);
        assert_eq!(config.inference.device, Device::Cpu);
        assert_eq!(config.plot.width, 640);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [evaluation]
            output_dir = "out/eval"

            [inference]
            batch_size = 8
            device = "cuda:1"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.evaluation.output_dir, PathBuf::from("out/eval"));
        assert_eq!(config.evaluation.label_column, "yo2");
        assert_eq!(config.inference.batch_size, 8);
        assert_eq!(config.inference.max_seq_length, 512);
        assert_eq!(config.inference.device, Device::Cuda(1));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").expect("empty config is valid");
        assert_eq!(config.evaluation.output_dir, PathBuf::from("evaluation_results"));
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
    }

    #[test]
    fn test_invalid_device_rejected() {
        let result = Config::from_toml("[inference]\ndevice = \"quantum\"\n");
        assert!(result.is_err());
    }
}
