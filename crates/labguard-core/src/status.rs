//! Status resolution.
//!
//! An explicit qualifier from the report wins when it is recognised;
//! otherwise the status is inferred from the reference range, with the
//! critical band checked first.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::knowledge::{CanonicalTest, ReferenceRange};
use crate::types::{Status, StatusSource};

const HIGH_WORDS: &[&str] = &["high", "h", "hi", "hgh", "ligh", "hig", "elevated"];
const LOW_WORDS: &[&str] = &["low", "l", "lo", "loh", "decreased"];
const NORMAL_WORDS: &[&str] = &["normal", "n", "nl", "noraml", "wnl"];
const CRITICAL_WORDS: &[&str] = &["critical", "crit", "panic"];

/// What to do when an explicit qualifier disagrees with the reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusConflictPolicy {
    /// Keep the status written in the report
    #[default]
    Explicit,
    /// Replace it with the range-based status
    Computed,
    /// Reject the fragment
    Reject,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatusError {
    #[error("report says {explicit} but {value} is {computed} for range [{}, {}]", .range.low, .range.high)]
    Conflict {
        explicit: Status,
        computed: Status,
        value: f64,
        range: ReferenceRange,
    },
}

/// Resolved status together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDecision {
    pub status: Status,
    pub source: StatusSource,
}

fn clean_token(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn vocabulary_lookup(token: &str) -> Option<Status> {
    [
        (Status::High, HIGH_WORDS),
        (Status::Low, LOW_WORDS),
        (Status::Normal, NORMAL_WORDS),
        (Status::Critical, CRITICAL_WORDS),
    ]
    .into_iter()
    .find(|(_, words)| words.contains(&token))
    .map(|(status, _)| status)
}

/// True when `raw` is exactly one of the recognised status words.
pub fn is_status_word(raw: &str) -> bool {
    vocabulary_lookup(&clean_token(raw)).is_some()
}

/// Map a raw status qualifier to a status.
///
/// Exact vocabulary words are tried first, then whole keywords within a
/// phrase ("very high", "critically low"). Returns `None` for anything
/// else, including notes like "see below".
pub fn parse_status(raw: &str) -> Option<Status> {
    let token = clean_token(raw);
    if token.is_empty() {
        return None;
    }

    if let Some(status) = vocabulary_lookup(&token) {
        return Some(status);
    }

    let words: Vec<&str> = token
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |keywords: &[&str]| words.iter().any(|w| keywords.contains(w));

    if has(&["abnormal"]) {
        return None;
    }
    if has(&["critical", "critically", "panic"]) {
        Some(Status::Critical)
    } else if has(&["high", "higher", "elevated"]) {
        Some(Status::High)
    } else if has(&["low", "lower", "decreased"]) {
        Some(Status::Low)
    } else if has(&["normal", "wnl"]) {
        Some(Status::Normal)
    } else {
        None
    }
}

/// Classify a value against the test's critical band and reference range.
///
/// Range bounds are inclusive; the critical band applies strictly beyond
/// its bounds.
pub fn infer_status(test: &CanonicalTest, value: f64) -> Status {
    if test.critical.is_some_and(|band| band.is_critical(value)) {
        Status::Critical
    } else if value < test.range.low {
        Status::Low
    } else if value > test.range.high {
        Status::High
    } else {
        Status::Normal
    }
}

/// Whether an explicit status is consistent with the computed one.
///
/// High/Low agree with Critical when they point the same direction.
fn agrees(explicit: Status, computed: Status, value: f64, range: &ReferenceRange) -> bool {
    match (explicit, computed) {
        (a, b) if a == b => true,
        (Status::Critical, Status::High | Status::Low) => true,
        (Status::High, Status::Critical) => value > range.high,
        (Status::Low, Status::Critical) => value < range.low,
        _ => false,
    }
}

/// Decide the status of a normalized value.
pub fn resolve_status(
    test: &CanonicalTest,
    value: f64,
    explicit: Option<&str>,
    policy: StatusConflictPolicy,
) -> Result<StatusDecision, StatusError> {
    let computed = infer_status(test, value);
    let inferred = StatusDecision {
        status: computed,
        source: StatusSource::Inferred,
    };

    let Some(raw) = explicit else {
        return Ok(inferred);
    };

    let Some(stated) = parse_status(raw) else {
        debug!(test = %test.id, token = raw, "unrecognised status token, inferring from range");
        return Ok(inferred);
    };

    let stated_decision = StatusDecision {
        status: stated,
        source: StatusSource::Explicit,
    };

    if stated == computed {
        return Ok(stated_decision);
    }

    if agrees(stated, computed, value, &test.range) {
        return Ok(match policy {
            StatusConflictPolicy::Computed => inferred,
            _ => stated_decision,
        });
    }

    match policy {
        StatusConflictPolicy::Explicit => {
            debug!(
                test = %test.id,
                explicit = %stated,
                computed = %computed,
                value,
                "explicit status disagrees with reference range"
            );
            Ok(stated_decision)
        }
        StatusConflictPolicy::Computed => Ok(inferred),
        StatusConflictPolicy::Reject => Err(StatusError::Conflict {
            explicit: stated,
            computed,
            value,
            range: test.range,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;

    fn glucose() -> CanonicalTest {
        KnowledgeBase::builtin().unwrap().get("glucose").unwrap().clone()
    }

    #[test]
    fn test_parse_vocabulary() {
        assert_eq!(parse_status("H"), Some(Status::High));
        assert_eq!(parse_status("Hgh"), Some(Status::High));
        assert_eq!(parse_status("ligh"), Some(Status::High));
        assert_eq!(parse_status("LOH"), Some(Status::Low));
        assert_eq!(parse_status("noraml"), Some(Status::Normal));
        assert_eq!(parse_status("Panic"), Some(Status::Critical));
        assert_eq!(parse_status("(Low)"), Some(Status::Low));
    }

    #[test]
    fn test_parse_keyword_containment() {
        assert_eq!(parse_status("very high"), Some(Status::High));
        assert_eq!(parse_status("critically low"), Some(Status::Critical));
        assert_eq!(parse_status("borderline low"), Some(Status::Low));
        assert_eq!(parse_status("abnormal"), None);
        assert_eq!(parse_status("ref"), None);
        assert_eq!(parse_status(""), None);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        assert_eq!(parse_status("see below"), None);
        assert_eq!(parse_status("follow up"), None);
        assert_eq!(parse_status("highlighted"), None);
        assert_eq!(parse_status("slightly elevated"), Some(Status::High));
    }

    #[test]
    fn test_note_does_not_override_range() {
        let test = glucose();
        let decision =
            resolve_status(&test, 250.0, Some("see below"), StatusConflictPolicy::Explicit)
                .unwrap();
        assert_eq!(decision.status, Status::High);
        assert_eq!(decision.source, StatusSource::Inferred);
    }

    #[test]
    fn test_status_word_is_exact() {
        assert!(is_status_word("High"));
        assert!(is_status_word("l"));
        assert!(!is_status_word("mg/dL"));
        assert!(!is_status_word("very high"));
    }

    #[test]
    fn test_inclusive_bounds_are_normal() {
        let test = glucose();
        assert_eq!(infer_status(&test, 70.0), Status::Normal);
        assert_eq!(infer_status(&test, 100.0), Status::Normal);
        assert_eq!(infer_status(&test, 69.9), Status::Low);
        assert_eq!(infer_status(&test, 100.1), Status::High);
    }

    #[test]
    fn test_critical_band_checked_first() {
        let test = glucose();
        assert_eq!(infer_status(&test, 39.0), Status::Critical);
        assert_eq!(infer_status(&test, 40.0), Status::Low);
        assert_eq!(infer_status(&test, 501.0), Status::Critical);
        assert_eq!(infer_status(&test, 500.0), Status::High);
    }

    #[test]
    fn test_explicit_wins_by_default() {
        let test = glucose();
        let decision =
            resolve_status(&test, 90.0, Some("High"), StatusConflictPolicy::Explicit).unwrap();
        assert_eq!(decision.status, Status::High);
        assert_eq!(decision.source, StatusSource::Explicit);
    }

    #[test]
    fn test_computed_policy_overrides() {
        let test = glucose();
        let decision =
            resolve_status(&test, 90.0, Some("High"), StatusConflictPolicy::Computed).unwrap();
        assert_eq!(decision.status, Status::Normal);
        assert_eq!(decision.source, StatusSource::Inferred);
    }

    #[test]
    fn test_reject_policy_reports_conflict() {
        let test = glucose();
        let err =
            resolve_status(&test, 90.0, Some("High"), StatusConflictPolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            StatusError::Conflict {
                explicit: Status::High,
                computed: Status::Normal,
                ..
            }
        ));
    }

    #[test]
    fn test_same_direction_is_not_a_conflict() {
        let test = glucose();
        let decision =
            resolve_status(&test, 600.0, Some("H"), StatusConflictPolicy::Reject).unwrap();
        assert_eq!(decision.status, Status::High);
    }

    #[test]
    fn test_unrecognised_token_falls_back_to_range() {
        let test = glucose();
        let decision =
            resolve_status(&test, 250.0, Some("see note"), StatusConflictPolicy::Reject).unwrap();
        assert_eq!(decision.status, Status::High);
        assert_eq!(decision.source, StatusSource::Inferred);
    }
}
