//! Ingestion: the text and image entry points in front of the core pipeline.
//!
//! Image ingestion runs one OCR pass on the original image. When its
//! average confidence is below the configured threshold, exactly one more
//! pass runs with handwriting preprocessing. There is no further retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use labguard_core::{ConfigError, KnowledgeBase, Pipeline, ProcessError, ReportOutcome};

use crate::config::IngestConfig;
use crate::ocr::{OcrEngine, OcrError, OcrOutput, PreprocessStrategy};

/// Errors from ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("OCR produced no text after {passes} pass(es)")]
    NoText { passes: u8 },

    #[error("OCR pass timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl IngestError {
    /// True when the request carried no usable text at all.
    pub fn is_input_failure(&self) -> bool {
        matches!(
            self,
            IngestError::NoText { .. } | IngestError::Process(ProcessError::InputEmpty)
        )
    }

    /// Stable machine-readable name of the failure.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Ocr(_) => "OcrFailed",
            IngestError::NoText { .. } => "NoText",
            IngestError::Timeout(_) => "Timeout",
            IngestError::Process(ProcessError::InputEmpty) => "InputEmpty",
            IngestError::Process(ProcessError::Config(_)) => "InvalidConfig",
        }
    }
}

/// Where the report text came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputSource {
    Text,
    Image {
        /// OCR passes run (1 or 2)
        passes: u8,

        /// Average confidence of the pass whose text was used
        confidence: f64,

        engine: String,
    },
}

/// A report outcome plus ingestion metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    #[serde(flatten)]
    pub outcome: ReportOutcome,

    pub source: InputSource,

    pub ingested_at: DateTime<Utc>,
}

/// Feeds text or OCR'd images into the core pipeline.
pub struct Ingestor {
    kb: Arc<KnowledgeBase>,
    engine: Option<Arc<dyn OcrEngine>>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(kb: Arc<KnowledgeBase>, config: IngestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            kb,
            engine: None,
            config,
        })
    }

    /// Attach the OCR engine used by [`Ingestor::ingest_image`].
    pub fn with_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn pipeline(&self) -> Result<Pipeline<'_>, ProcessError> {
        Ok(Pipeline::new(&self.kb, self.config.pipeline.clone())?)
    }

    /// Process report text supplied directly by the caller.
    pub fn ingest_text(&self, text: &str) -> Result<IngestReport, IngestError> {
        let outcome = self.pipeline()?.process(text)?;

        Ok(IngestReport {
            outcome,
            source: InputSource::Text,
            ingested_at: Utc::now(),
        })
    }

    /// OCR an image, then process the recognised text.
    pub async fn ingest_image(&self, image: &Path) -> Result<IngestReport, IngestError> {
        let engine = self.engine.as_deref().ok_or(OcrError::NotConfigured)?;
        let threshold = self.config.confidence_threshold;

        let mut chosen = self
            .run_pass(engine, image, PreprocessStrategy::Original)
            .await?;
        let mut passes = 1;
        let first_confidence = chosen.average_confidence();

        if first_confidence < threshold {
            warn!(
                engine = engine.name(),
                confidence = first_confidence,
                threshold,
                "Low OCR confidence, retrying with handwriting preprocessing"
            );
            passes = 2;

            match self
                .run_pass(engine, image, PreprocessStrategy::Handwriting)
                .await
            {
                Ok(second) if !second.text().is_empty() => chosen = second,
                Ok(_) => warn!("Handwriting pass produced no text, keeping first pass"),
                Err(e) => warn!(error = %e, "Handwriting pass failed, keeping first pass"),
            }
        }

        let text = chosen.text();
        if text.is_empty() {
            return Err(IngestError::NoText { passes });
        }

        let confidence = chosen.average_confidence();
        let outcome = self.pipeline()?.process(&text)?;

        info!(
            engine = engine.name(),
            passes,
            confidence,
            accepted = outcome.tests.len(),
            "image ingested"
        );

        Ok(IngestReport {
            outcome,
            source: InputSource::Image {
                passes,
                confidence,
                engine: engine.name().to_string(),
            },
            ingested_at: Utc::now(),
        })
    }

    /// One OCR pass bounded by the pass timeout.
    async fn run_pass(
        &self,
        engine: &dyn OcrEngine,
        image: &Path,
        strategy: PreprocessStrategy,
    ) -> Result<OcrOutput, IngestError> {
        let timeout = self.config.pass_timeout;

        match tokio::time::timeout(timeout, engine.extract(image, strategy)).await {
            Ok(Ok(output)) => {
                debug!(
                    strategy = strategy.as_str(),
                    lines = output.lines.len(),
                    confidence = output.average_confidence(),
                    "OCR pass complete"
                );
                Ok(output)
            }
            Ok(Err(e)) => {
                warn!(strategy = strategy.as_str(), error = %e, "OCR pass failed");
                Err(IngestError::Ocr(e))
            }
            Err(_) => {
                warn!(strategy = strategy.as_str(), timeout = ?timeout, "OCR pass timed out");
                Err(IngestError::Timeout(timeout))
            }
        }
    }
}
