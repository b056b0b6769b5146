//! Value and unit normalization.

use thiserror::Error;

use crate::knowledge::{CanonicalTest, KnowledgeBase};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("value token is empty")]
    Empty,

    #[error("value contains unexpected character '{0}'")]
    InvalidCharacter(char),

    #[error("value contains more than one decimal point")]
    MultipleDecimalPoints,

    #[error("value '{0}' has inconsistent digit grouping")]
    BadGrouping(String),

    #[error("value '{0}' is not a number")]
    Malformed(String),

    #[error("value is out of range")]
    NotFinite,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("unit '{unit}' is not accepted; expected one of: {}", .accepted.join(", "))]
    NotAccepted { unit: String, accepted: Vec<String> },
}

/// Parse a raw numeric token.
///
/// With `repair_ocr_digits`, letter O is read as zero. Only digits, `,`
/// and `.` are allowed afterwards. Separators are interpreted as follows:
/// a lone `.` is decimal; commas alone are thousands separators when every
/// group after the first has three digits, or a decimal comma when a single
/// comma is followed by one or two digits; with both present the last one
/// is the decimal separator.
pub fn parse_value(raw: &str, repair_ocr_digits: bool) -> Result<f64, ValueError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(ValueError::Empty);
    }

    let repaired: String = token
        .chars()
        .map(|c| match c {
            'o' | 'O' if repair_ocr_digits => '0',
            c => c,
        })
        .collect();

    if let Some(c) = repaired
        .chars()
        .find(|c| !(c.is_ascii_digit() || *c == ',' || *c == '.'))
    {
        return Err(ValueError::InvalidCharacter(c));
    }

    let dots = repaired.matches('.').count();
    let commas = repaired.matches(',').count();

    let plain = match (commas, dots) {
        (0, 0) | (0, 1) => repaired,
        (0, _) => return Err(ValueError::MultipleDecimalPoints),
        (_, 0) => comma_only(&repaired)?,
        _ => mixed_separators(&repaired)?,
    };

    let value: f64 = plain
        .parse()
        .map_err(|_| ValueError::Malformed(token.to_string()))?;

    if !value.is_finite() {
        return Err(ValueError::NotFinite);
    }

    Ok(value)
}

/// True when `groups` are valid thousands groups: the first 1-3 digits,
/// the rest exactly three.
fn is_thousands_grouping(groups: &[&str]) -> bool {
    match groups.split_first() {
        Some((first, rest)) => {
            (1..=3).contains(&first.len()) && rest.iter().all(|g| g.len() == 3)
        }
        None => false,
    }
}

fn comma_only(token: &str) -> Result<String, ValueError> {
    let groups: Vec<&str> = token.split(',').collect();

    if let [whole, fraction] = groups.as_slice() {
        if !whole.is_empty() && (1..=2).contains(&fraction.len()) {
            return Ok(format!("{}.{}", whole, fraction));
        }
    }

    if is_thousands_grouping(&groups) {
        Ok(groups.concat())
    } else {
        Err(ValueError::BadGrouping(token.to_string()))
    }
}

fn mixed_separators(token: &str) -> Result<String, ValueError> {
    let bad = || ValueError::BadGrouping(token.to_string());

    let (decimal_at, decimal, thousands) = match (token.rfind('.'), token.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => (dot, '.', ','),
        (Some(_), Some(comma)) => (comma, ',', '.'),
        _ => return Err(bad()),
    };

    if token.matches(decimal).count() != 1 {
        return Err(bad());
    }

    let whole = &token[..decimal_at];
    let fraction = &token[decimal_at + 1..];
    if fraction.is_empty() {
        return Err(bad());
    }

    let groups: Vec<&str> = whole.split(thousands).collect();
    if !is_thousands_grouping(&groups) {
        return Err(bad());
    }

    Ok(format!("{}.{}", groups.concat(), fraction))
}

/// Check a raw unit token against the units a test accepts.
///
/// Returns the test's canonical unit. Every accepted spelling denotes that
/// one unit, so a missing unit is unambiguous and defaults to it. An
/// unaccepted unit is never converted.
pub fn validate_unit<'kb>(
    kb: &KnowledgeBase,
    test: &'kb CanonicalTest,
    raw: Option<&str>,
) -> Result<&'kb str, UnitError> {
    let raw = match raw.map(str::trim) {
        Some(unit) if !unit.is_empty() => unit,
        _ => return Ok(test.unit.as_str()),
    };

    let key = kb.canonical_unit_key(raw);
    if test.unit_keys().iter().any(|k| *k == key) {
        Ok(test.unit.as_str())
    } else {
        Err(UnitError::NotAccepted {
            unit: raw.to_string(),
            accepted: test.all_units().map(str::to_string).collect(),
        })
    }
}
