//! Guardrail: the per-fragment accept/reject policy and the report pipeline.
//!
//! Each fragment goes through name, value, unit and status checks in that
//! order and stops at the first failure. A failed check never falls back
//! to a guessed value; the fragment becomes a [`Rejection`] instead.

use tracing::{debug, info};

use crate::config::{ConfigError, PipelineConfig};
use crate::extract::fragments;
use crate::knowledge::KnowledgeBase;
use crate::normalize::{parse_value, validate_unit};
use crate::resolver::NameResolver;
use crate::status::resolve_status;
use crate::summarizer::Summarizer;
use crate::types::{RawFragment, ReasonCode, Rejection, ReportOutcome, Stage, TestResult};
use crate::ProcessError;

/// A configured pipeline bound to one knowledge base.
///
/// Holds only shared references and plain settings, so one pipeline can
/// serve any number of requests concurrently.
pub struct Pipeline<'kb> {
    kb: &'kb KnowledgeBase,
    config: PipelineConfig,
    resolver: NameResolver<'kb>,
    summarizer: Summarizer,
}

impl<'kb> Pipeline<'kb> {
    pub fn new(kb: &'kb KnowledgeBase, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            kb,
            resolver: NameResolver::new(kb, config.match_threshold),
            summarizer: Summarizer::new(config.summary_limit),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &'kb KnowledgeBase {
        self.kb
    }

    /// Accept or reject a single fragment.
    pub fn validate(&self, fragment: &RawFragment<'_>) -> Result<TestResult, Rejection> {
        let resolution = self.resolver.resolve(fragment.name).map_err(|e| {
            Rejection::new(fragment, ReasonCode::NameUnresolved, Stage::Name, e.to_string())
        })?;
        let test = resolution.test;

        let value = parse_value(fragment.value, self.config.repair_ocr_digits).map_err(|e| {
            Rejection::new(fragment, ReasonCode::ValueUnparsable, Stage::Value, e.to_string())
        })?;

        let unit = validate_unit(self.kb, test, fragment.unit).map_err(|e| {
            Rejection::new(fragment, ReasonCode::UnitInvalid, Stage::Unit, e.to_string())
        })?;

        let decision = resolve_status(test, value, fragment.status, self.config.status_conflict)
            .map_err(|e| {
                Rejection::new(fragment, ReasonCode::StatusConflict, Stage::Status, e.to_string())
            })?;

        if !resolution.exact {
            debug!(
                raw = fragment.name,
                matched = resolution.matched,
                score = resolution.score,
                test = %test.id,
                "name corrected by fuzzy match"
            );
        }

        Ok(TestResult {
            id: test.id.clone(),
            name: test.name.clone(),
            value,
            unit: unit.to_string(),
            status: decision.status,
            status_source: decision.source,
            ref_range: test.range,
            explanation: self.summarizer.explain(test, decision.status),
        })
    }

    /// Process one report.
    ///
    /// Fails only when the text is empty or whitespace. A report in which
    /// nothing was found, or everything was rejected, is still a success.
    pub fn process(&self, text: &str) -> Result<ReportOutcome, ProcessError> {
        if text.trim().is_empty() {
            return Err(ProcessError::InputEmpty);
        }

        let mut tests = Vec::new();
        let mut rejected = Vec::new();

        for fragment in fragments(text) {
            match self.validate(&fragment) {
                Ok(result) => tests.push(result),
                Err(rejection) => {
                    debug!(
                        reason = %rejection.reason,
                        stage = ?rejection.stage,
                        start = rejection.span.start,
                        end = rejection.span.end,
                        detail = %rejection.detail,
                        "fragment rejected"
                    );
                    rejected.push(rejection);
                }
            }
        }

        let extracted = tests.len() + rejected.len();
        let confidence = if extracted == 0 {
            0.0
        } else {
            (tests.len() as f64 / extracted as f64 * 100.0).round() / 100.0
        };

        let summary = self.summarizer.narrative(&tests, rejected.len());

        info!(
            accepted = tests.len(),
            rejected = rejected.len(),
            confidence,
            "report processed"
        );

        Ok(ReportOutcome {
            tests,
            rejected,
            summary,
            confidence,
        })
    }
}
