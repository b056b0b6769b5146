//! # labguard-core
//!
//! Deterministic normalization and validation of lab report text.
//!
//! Given noisy report text (typed, OCR'd, or handwritten then OCR'd) this
//! crate produces validated test results, the fragments it refused, and a
//! plain-language summary.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same text and knowledge base always produce the same outcome
//! 2. **No guessing**: Uncertain fragments are rejected with a reason, never repaired by inference
//! 3. **Accounted for**: Every extracted fragment ends as exactly one result or one rejection
//! 4. **Order preserving**: Results and rejections follow document order
//!
//! ## Example
//!
//! ```rust,ignore
//! use labguard_core::{process_report, KnowledgeBase};
//!
//! let kb = KnowledgeBase::builtin()?;
//! let outcome = process_report(kb, "Hemoglobin: 10.2 g/dL (Low)")?;
//!
//! for test in &outcome.tests {
//!     println!("{} {} {} ({})", test.name, test.value, test.unit, test.status);
//! }
//! println!("{}", outcome.summary);
//! ```

pub mod config;
pub mod extract;
pub mod guardrail;
pub mod knowledge;
pub mod normalize;
pub mod resolver;
pub mod status;
pub mod summarizer;
pub mod types;

// Re-export main types at crate root
pub use config::{ConfigError, PipelineConfig};
pub use extract::{fragments, Fragments};
pub use guardrail::Pipeline;
pub use knowledge::{CanonicalTest, KnowledgeBase, KnowledgeBaseError, ReferenceRange};
pub use resolver::{NameError, NameResolver, Resolution};
pub use status::{StatusConflictPolicy, StatusDecision};
pub use summarizer::Summarizer;
pub use types::{
    RawFragment, ReasonCode, Rejection, ReportOutcome, Span, Stage, Status, StatusSource,
    TestResult,
};

use thiserror::Error;

/// Request-level failures.
///
/// Per-fragment problems are never errors; they become rejections.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("no report text was provided")]
    InputEmpty,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Process report text with the default configuration.
///
/// This is the main entry point for labguard processing.
///
/// # Returns
///
/// A `ReportOutcome` containing:
/// - `tests`: accepted results in document order
/// - `rejected`: discarded fragments with reason codes
/// - `summary`: narrative of abnormal results
/// - `confidence`: share of extracted fragments that were accepted
pub fn process_report(kb: &KnowledgeBase, text: &str) -> Result<ReportOutcome, ProcessError> {
    process_report_with_config(kb, text, PipelineConfig::default())
}

/// Process report text with an explicit configuration.
pub fn process_report_with_config(
    kb: &KnowledgeBase,
    text: &str,
    config: PipelineConfig,
) -> Result<ReportOutcome, ProcessError> {
    let pipeline = Pipeline::new(kb, config)?;
    pipeline.process(text)
}
