//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::resolver::DEFAULT_MATCH_THRESHOLD;
use crate::status::StatusConflictPolicy;
use crate::summarizer::DEFAULT_SUMMARY_LIMIT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum fuzzy similarity (1-100) for a name to resolve
    pub match_threshold: u8,

    /// Read letter O as zero inside numeric tokens
    pub repair_ocr_digits: bool,

    pub status_conflict: StatusConflictPolicy,

    /// Abnormal results named in the narrative before "N more"
    pub summary_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            repair_ocr_digits: true,
            status_conflict: StatusConflictPolicy::default(),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.match_threshold) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be between 1 and 100, got {}",
                self.match_threshold
            )));
        }
        if self.summary_limit == 0 {
            return Err(ConfigError::Invalid(
                "summary_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
