//! # labguard-runtime
//!
//! Optional ingestion layer for labguard.
//!
//! This crate sits in front of the deterministic pipeline in
//! `labguard-core` and supplies it with text: either directly from the
//! caller, or from an image through an external OCR engine.
//!
//! ## Important
//!
//! This crate is OPTIONAL. `labguard-core` never performs OCR and never
//! blocks on I/O; everything asynchronous lives here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use labguard_core::KnowledgeBase;
//! use labguard_runtime::{CommandOcrEngine, IngestConfig, Ingestor};
//!
//! let kb = Arc::new(KnowledgeBase::builtin()?.clone());
//! let engine = Arc::new(CommandOcrEngine::new("lab-ocr"));
//! let ingestor = Ingestor::new(kb, IngestConfig::default())?.with_engine(engine);
//!
//! let report = ingestor.ingest_image("scan.jpg".as_ref()).await?;
//! println!("{}", report.outcome.summary);
//! ```

pub mod config;
pub mod ingest;
pub mod ocr;

pub use config::IngestConfig;
pub use ingest::{IngestError, IngestReport, Ingestor, InputSource};
pub use ocr::{CommandOcrEngine, OcrEngine, OcrError, OcrLine, OcrOutput, PreprocessStrategy};
