//! Summarizer: turns accepted results into patient-facing text.
//!
//! Output is a pure function of its inputs, so the same results always
//! produce the same narrative and explanations.

use crate::knowledge::CanonicalTest;
use crate::types::{Status, TestResult};

/// Default number of abnormal results named in the narrative.
pub const DEFAULT_SUMMARY_LIMIT: usize = 3;

const NOTHING_FOUND: &str = "No lab test results were found in the report.";
const NOTHING_VERIFIED: &str = "No lab test results could be verified in the report.";
const ALL_NORMAL: &str = "All test results appear to be within the normal range.";

/// The Summarizer builds the narrative and per-test explanations.
pub struct Summarizer {
    summary_limit: usize,
}

impl Summarizer {
    pub fn new(summary_limit: usize) -> Self {
        Self {
            summary_limit: summary_limit.max(1),
        }
    }

    /// Explanation of one result, from the test's template for `status`.
    ///
    /// A `{name}` placeholder in the template is replaced by the display
    /// name; without one the name is prefixed.
    pub fn explain(&self, test: &CanonicalTest, status: Status) -> String {
        match (test.explanations.get(status), status) {
            (Some(template), _) if template.contains("{name}") => {
                template.replace("{name}", &test.name)
            }
            (Some(template), _) => format!("{} {}", test.name, template),
            (None, Status::Normal) => {
                format!("{}: This result is within the normal range.", test.name)
            }
            (None, Status::Critical) => format!(
                "{}: This result is in the critical range and should be reviewed by a clinician promptly.",
                test.name
            ),
            (None, _) => format!(
                "{}: No specific explanation is available for this result.",
                test.name
            ),
        }
    }

    /// Narrative sentence for a whole report.
    ///
    /// `rejected` is the number of discarded fragments, used to tell an
    /// empty report apart from one where nothing could be verified.
    pub fn narrative(&self, results: &[TestResult], rejected: usize) -> String {
        if results.is_empty() {
            return if rejected == 0 {
                NOTHING_FOUND.to_string()
            } else {
                NOTHING_VERIFIED.to_string()
            };
        }

        let abnormal: Vec<String> = results
            .iter()
            .filter(|r| r.status.is_abnormal())
            .map(|r| format!("{} {}", r.status, r.name))
            .collect();

        if abnormal.is_empty() {
            return ALL_NORMAL.to_string();
        }

        let mut items: Vec<String> = abnormal.iter().take(self.summary_limit).cloned().collect();
        let hidden = abnormal.len() - items.len();
        if hidden > 0 {
            items.push(format!("{} more abnormal result(s)", hidden));
        }

        format!("Your report shows {}.", join_list(&items))
    }
}

impl Default for Summarizer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_LIMIT)
    }
}

/// "a", "a and b", "a, b, and c".
fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [head @ .., last] => format!("{}, and {}", head.join(", "), last),
    }
}
