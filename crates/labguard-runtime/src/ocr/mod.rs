//! OCR engine abstractions for labguard-runtime.
//!
//! The OCR engine is an external collaborator: it turns an image into text
//! lines with confidence scores. Image preprocessing is selected per pass
//! through [`PreprocessStrategy`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod command;

pub use command::CommandOcrEngine;

/// Errors from OCR engines.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Failed to launch OCR program '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR program exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Invalid OCR output: {0}")]
    InvalidOutput(String),

    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("No OCR engine configured")]
    NotConfigured,
}

/// Image preprocessing applied before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessStrategy {
    /// The image as supplied
    Original,
    /// Grayscale, contrast and threshold tuned for handwriting
    Handwriting,
}

impl PreprocessStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessStrategy::Original => "original",
            PreprocessStrategy::Handwriting => "handwriting",
        }
    }
}

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub text: String,

    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f64,
}

/// Everything one OCR pass recognised.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OcrOutput {
    pub lines: Vec<OcrLine>,
}

impl OcrOutput {
    pub fn new(lines: Vec<OcrLine>) -> Self {
        Self { lines }
    }

    /// Parse the JSON document an OCR program writes to stdout.
    pub fn from_json(bytes: &[u8]) -> Result<Self, OcrError> {
        let output: OcrOutput =
            serde_json::from_slice(bytes).map_err(|e| OcrError::InvalidOutput(e.to_string()))?;

        if let Some(line) = output
            .lines
            .iter()
            .find(|l| !(0.0..=1.0).contains(&l.confidence))
        {
            return Err(OcrError::InvalidOutput(format!(
                "confidence {} outside [0, 1]",
                line.confidence
            )));
        }

        Ok(output)
    }

    /// Recognised text, one line per row, blank lines dropped.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Mean line confidence rounded to four decimals, 0.0 without lines.
    pub fn average_confidence(&self) -> f64 {
        if self.lines.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.lines.iter().map(|l| l.confidence).sum();
        (sum / self.lines.len() as f64 * 10_000.0).round() / 10_000.0
    }
}

/// Trait for OCR engines.
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise the text in `image` using the given preprocessing.
    async fn extract(
        &self,
        image: &Path,
        strategy: PreprocessStrategy,
    ) -> Result<OcrOutput, OcrError>;

    /// Get the engine name for logging.
    fn name(&self) -> &str;
}
