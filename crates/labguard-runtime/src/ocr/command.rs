//! OCR through an external program.
//!
//! The program is invoked as `<program> [args..] --strategy <strategy> <image>`
//! and must print `{"lines": [{"text": ..., "confidence": ...}]}` on stdout.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use super::{OcrEngine, OcrError, OcrOutput, PreprocessStrategy};

/// An [`OcrEngine`] backed by a command-line OCR program.
#[derive(Debug, Clone)]
pub struct CommandOcrEngine {
    program: String,
    args: Vec<String>,
}

impl CommandOcrEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before `--strategy`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl OcrEngine for CommandOcrEngine {
    async fn extract(
        &self,
        image: &Path,
        strategy: PreprocessStrategy,
    ) -> Result<OcrOutput, OcrError> {
        if tokio::fs::metadata(image).await.is_err() {
            return Err(OcrError::ImageNotFound(image.to_path_buf()));
        }

        tracing::debug!(
            program = %self.program,
            strategy = strategy.as_str(),
            image = %image.display(),
            "running OCR program"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--strategy")
            .arg(strategy.as_str())
            .arg(image)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        OcrOutput::from_json(&output.stdout)
    }

    fn name(&self) -> &str {
        &self.program
    }
}
