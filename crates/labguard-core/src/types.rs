//! Core types for lab report normalization.
//!
//! Fragments borrow from the input text; everything that leaves the
//! pipeline (test results, rejections, the report outcome) is owned and
//! serializable.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::knowledge::ReferenceRange;

/// Abnormality classification of a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Low,
    Normal,
    High,
    /// Beyond the critical band defined by the knowledge base
    Critical,
}

impl Status {
    /// Lowercase label used in narratives and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Low => "low",
            Status::Normal => "normal",
            Status::High => "high",
            Status::Critical => "critical",
        }
    }

    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Status::Normal)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a result's status came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    /// Written in the report text
    Explicit,
    /// Computed from the reference range
    Inferred,
}

/// Byte offsets of a fragment within the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A candidate test-result record pulled out of raw text, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawFragment<'t> {
    /// Location of `text` in the input
    pub span: Span,

    /// The matched text, trimmed
    pub text: &'t str,

    /// Raw test name token
    pub name: &'t str,

    /// Raw numeric token
    pub value: &'t str,

    /// Raw unit token, if any
    pub unit: Option<&'t str>,

    /// Raw status qualifier, if any (e.g. "Low", "H")
    pub status: Option<&'t str>,
}

/// A validated, normalized lab test result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Canonical test identifier from the knowledge base
    pub id: String,

    /// Canonical display name
    pub name: String,

    /// Normalized numeric value
    pub value: f64,

    /// Canonical unit
    pub unit: String,

    pub status: Status,

    pub status_source: StatusSource,

    /// Reference range the status was judged against
    pub ref_range: ReferenceRange,

    /// Patient-facing explanation of this result
    pub explanation: String,
}

/// Why a fragment was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Name did not meet the matching threshold against any canonical entry
    NameUnresolved,

    /// Unit absent and ambiguous, or present but not accepted for the test
    UnitInvalid,

    /// Numeric token could not be parsed
    ValueUnparsable,

    /// Explicit status contradicts the range (only under the `reject` policy)
    StatusConflict,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NameUnresolved => "NameUnresolved",
            ReasonCode::UnitInvalid => "UnitInvalid",
            ReasonCode::ValueUnparsable => "ValueUnparsable",
            ReasonCode::StatusConflict => "StatusConflict",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage at which a fragment was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Name,
    Value,
    Unit,
    Status,
}

/// A discarded fragment with the reason it was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Original fragment text
    pub text: String,

    pub reason: ReasonCode,

    pub stage: Stage,

    /// Human-readable explanation of the failure
    pub detail: String,

    pub span: Span,
}

impl Rejection {
    pub fn new(
        fragment: &RawFragment<'_>,
        reason: ReasonCode,
        stage: Stage,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            text: fragment.text.to_string(),
            reason,
            stage,
            detail: detail.into(),
            span: fragment.span,
        }
    }
}

/// The structured result of processing one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOutcome {
    /// Accepted results, in document order
    pub tests: Vec<TestResult>,

    /// Discarded fragments, in document order
    pub rejected: Vec<Rejection>,

    /// Patient-facing narrative
    pub summary: String,

    /// Share of extracted fragments that were accepted (0.0 - 1.0)
    pub confidence: f64,
}

impl ReportOutcome {
    /// True when the text contained no candidate fragments at all.
    pub fn is_extraction_empty(&self) -> bool {
        self.tests.is_empty() && self.rejected.is_empty()
    }

    /// Results whose status is not Normal.
    pub fn abnormal(&self) -> impl Iterator<Item = &TestResult> {
        self.tests.iter().filter(|t| t.status.is_abnormal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&Status::High).unwrap();
        assert_eq!(json, "\"high\"");
        assert_eq!(Status::Critical.to_string(), "critical");
    }

    #[test]
    fn test_reason_code_serializes_as_taxonomy_name() {
        let json = serde_json::to_string(&ReasonCode::NameUnresolved).unwrap();
        assert_eq!(json, "\"NameUnresolved\"");
    }

    #[test]
    fn test_rejection_copies_fragment_text() {
        let fragment = RawFragment {
            span: Span::new(4, 15),
            text: "Xyzzy 5 foo",
            name: "Xyzzy",
            value: "5",
            unit: Some("foo"),
            status: None,
        };
        let rejection = Rejection::new(
            &fragment,
            ReasonCode::NameUnresolved,
            Stage::Name,
            "no match",
        );
        assert_eq!(rejection.text, "Xyzzy 5 foo");
        assert_eq!(rejection.span.len(), 11);
    }

    #[test]
    fn test_empty_outcome_is_extraction_empty() {
        let outcome = ReportOutcome {
            tests: vec![],
            rejected: vec![],
            summary: String::new(),
            confidence: 0.0,
        };
        assert!(outcome.is_extraction_empty());
        assert_eq!(outcome.abnormal().count(), 0);
    }
}
