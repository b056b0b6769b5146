//! Ingestion configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use labguard_core::{ConfigError, PipelineConfig};

/// Settings for turning images and text into report outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Average OCR confidence below which the handwriting pass runs
    pub confidence_threshold: f64,

    /// Upper bound on each OCR pass, e.g. "30s"
    #[serde(with = "duration_human")]
    pub pass_timeout: Duration,

    pub pipeline: PipelineConfig,
}

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.90,
            pass_timeout: Duration::from_secs(30),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: IngestConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be between 0 and 1, got {}",
                self.confidence_threshold
            )));
        }
        if self.pass_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "pass_timeout must be greater than zero".to_string(),
            ));
        }
        self.pipeline.validate()
    }
}
