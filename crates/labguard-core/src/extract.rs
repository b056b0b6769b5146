//! Line extraction.
//!
//! Scans raw report text for `name value [unit] [status]` candidates.
//! The pattern is permissive on purpose: every decision about whether a
//! candidate is trustworthy is made later by the pipeline. The one thing
//! decided here is whether a trailing word is a status qualifier at all,
//! since reference notes such as `(Normal: 70-100)` look like one.

use lazy_static::lazy_static;
use regex::{CaptureMatches, Captures, Match, Regex};

use crate::status::is_status_word;
use crate::types::{RawFragment, Span};

lazy_static! {
    // Character classes never include line breaks, commas or semicolons
    // outside the value token, so those act as fragment delimiters.
    // The second branch takes a name fused to its value ("Hb10.2"); it is
    // only tried when no separated reading exists at the same position.
    static ref FRAGMENT_PATTERN: Regex = Regex::new(
        r"(?xi)
        (?:
            (?P<name>[a-z][a-z0-9\x20\t()'\-]*?)
            (?:[\x20\t]*[:=\-][\x20\t]*|[\x20\t]+)
            (?P<value>[0-9][0-9o]*(?:[.,][0-9o]+)*)
        |
            (?P<fused_name>[a-z][a-z0-9\x20\t()'\-]*?[a-z])
            (?P<fused_value>[0-9][0-9o]*(?:[.,][0-9o]+)*)\b
        )
        (?:[\x20\t]*(?P<unit>
            (?:[0-9]+\^[0-9]+)?
            [a-zµμ%/][a-z0-9µμ%/^.]*
            (?:[\x20\t]*/[\x20\t]*[a-zµμ][a-z0-9µμ^]*)?
        ))?
        (?:
            [\x20\t]*[(\[][\x20\t]*(?P<status>[a-z][a-z\x20\t]*)(?P<close>[)\]])?
            |
            [\x20\t]+(?P<flag>critical|normal|high|low|hi|lo|h|l|n)\b
        )?
        "
    ).unwrap();
}

/// Lazy iterator over the candidate fragments of a text, in document order.
pub struct Fragments<'t> {
    text: &'t str,
    captures: CaptureMatches<'static, 't>,
}

impl<'t> Iterator for Fragments<'t> {
    type Item = RawFragment<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let caps = self.captures.next()?;
            if let Some(fragment) = to_fragment(self.text, &caps) {
                return Some(fragment);
            }
        }
    }
}

/// Extract candidate fragments from `text`.
///
/// Calling this again on the same text yields the same sequence.
pub fn fragments(text: &str) -> Fragments<'_> {
    let pattern: &'static Regex = &FRAGMENT_PATTERN;
    Fragments {
        text,
        captures: pattern.captures_iter(text),
    }
}

fn rest_after<'t>(text: &'t str, m: &Match<'_>) -> &'t str {
    text[m.end()..].trim_start_matches([' ', '\t'])
}

/// Nothing but a delimiter follows: end of text, line, or list item.
fn ends_fragment(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(['\n', '\r', ',', ';'])
}

/// A number or a `:`/`=`/`-` follows, as in "Normal: 70-100" or "Ref 12-16".
fn introduces_reference(rest: &str) -> bool {
    rest.starts_with(|c: char| c.is_ascii_digit() || matches!(c, ':' | '=' | '-'))
}

fn to_fragment<'t>(text: &'t str, caps: &Captures<'t>) -> Option<RawFragment<'t>> {
    let whole = caps.get(0)?;
    let name = caps.name("name").or_else(|| caps.name("fused_name"))?;
    let value = caps.name("value").or_else(|| caps.name("fused_value"))?;

    // "Hb10.2g/dL" backtracks to "Hb10"; a truncated number is not a value
    if caps.name("fused_value").is_some() {
        let rest = &text[value.end()..];
        let mut chars = rest.chars();
        if matches!(chars.next(), Some('.' | ','))
            && chars.next().is_some_and(|c| c.is_ascii_digit())
        {
            return None;
        }
    }

    let mut unit = caps
        .name("unit")
        .filter(|m| !m.as_str().trim().trim_end_matches('.').is_empty());

    let mut status = None;
    if let Some(m) = caps.name("status") {
        let closed = caps.name("close").is_some();
        if closed || ends_fragment(rest_after(text, &whole)) {
            status = Some(m);
        }
    } else if let Some(m) = caps.name("flag") {
        if !introduces_reference(rest_after(text, &whole)) {
            status = Some(m);
        }
    }

    let mut end = unit.map_or(value.end(), |u| u.end());
    if status.is_some() {
        end = whole.end();
    }

    // "Glucose 250 High": the status word was captured as the unit
    if status.is_none() {
        if let Some(u) = unit.filter(|u| is_status_word(u.as_str())) {
            unit = None;
            if introduces_reference(rest_after(text, &u)) {
                end = value.end();
            } else {
                status = Some(u);
            }
        }
    }

    let start = whole.start();
    let span_text = text[start..end].trim_end();

    Some(RawFragment {
        span: Span::new(start, start + span_text.len()),
        text: span_text,
        name: name.as_str().trim(),
        value: value.as_str(),
        unit: unit
            .map(|u| u.as_str().trim().trim_end_matches('.'))
            .filter(|u| !u.is_empty()),
        status: status.map(|m| m.as_str().trim()).filter(|s| !s.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Vec<RawFragment<'_>> {
        fragments(text).collect()
    }

    #[test]
    fn test_comma_delimited_with_status() {
        let text = "Hemoglobin: 10.2 g/dL (Low), WBC: 11,200 /uL (High)";
        let found = collect(text);
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].name, "Hemoglobin");
        assert_eq!(found[0].value, "10.2");
        assert_eq!(found[0].unit, Some("g/dL"));
        assert_eq!(found[0].status, Some("Low"));
        assert_eq!(found[0].text, "Hemoglobin: 10.2 g/dL (Low)");

        assert_eq!(found[1].name, "WBC");
        assert_eq!(found[1].value, "11,200");
        assert_eq!(found[1].unit, Some("/uL"));
        assert_eq!(found[1].status, Some("High"));
    }

    #[test]
    fn test_multiline_and_semicolons() {
        let text = "Glucose 250 mg/dL\nCreatinine - 1.1 mg/dL; Sodium = 140 mmol/L";
        let names: Vec<&str> = collect(text).iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Glucose", "Creatinine", "Sodium"]);
    }

    #[test]
    fn test_span_points_into_input() {
        let text = "Report\n  Hemglobin 13.5 g/dL  \nend";
        let found = collect(text);
        assert_eq!(found.len(), 1);
        let span = found[0].span;
        assert_eq!(&text[span.start..span.end], found[0].text);
        assert_eq!(found[0].text, "Hemglobin 13.5 g/dL");
    }

    #[test]
    fn test_status_word_in_unit_position() {
        let found = collect("Glucose 250 High");
        assert_eq!(found[0].unit, None);
        assert_eq!(found[0].status, Some("High"));
    }

    #[test]
    fn test_trailing_flag_after_unit() {
        let found = collect("Potassium 5.9 mmol/L H");
        assert_eq!(found[0].unit, Some("mmol/L"));
        assert_eq!(found[0].status, Some("H"));
    }

    #[test]
    fn test_unclosed_and_bracketed_qualifiers() {
        let found = collect("Hb 9.1 g/dL (Low\nWBC 12000 /uL [H]");
        assert_eq!(found[0].status, Some("Low"));
        assert_eq!(found[1].status, Some("H"));
    }

    #[test]
    fn test_names_with_digits_and_parentheses() {
        let found = collect("HbA1c 5.6 %\nBlood Sugar (Fasting): 95 mg/dL");
        assert_eq!(found[0].name, "HbA1c");
        assert_eq!(found[0].unit, Some("%"));
        assert_eq!(found[1].name, "Blood Sugar (Fasting)");
    }

    #[test]
    fn test_power_of_ten_unit() {
        let found = collect("RBC 4.5 10^6/uL");
        assert_eq!(found[0].unit, Some("10^6/uL"));
    }

    #[test]
    fn test_ocr_letter_o_kept_in_value() {
        let found = collect("Platelets 15000o /uL");
        assert_eq!(found[0].value, "15000o");
    }

    #[test]
    fn test_sentence_period_not_part_of_unit() {
        let found = collect("Glucose 95 mg/dL.");
        assert_eq!(found[0].unit, Some("mg/dL"));
    }

    #[test]
    fn test_text_without_numbers_yields_nothing() {
        assert!(collect("Patient feels fine, no complaints").is_empty());
        assert!(collect("").is_empty());
    }

    #[test]
    fn test_reference_annotation_is_not_a_status() {
        let found = collect("Glucose 250 mg/dL (Normal: 70-100)");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unit, Some("mg/dL"));
        assert_eq!(found[0].status, None);
        assert_eq!(found[0].text, "Glucose 250 mg/dL");

        let found = collect("Hemoglobin 10.2 g/dL (Ref 12-16)");
        assert_eq!(found[0].status, None);
    }

    #[test]
    fn test_bare_flag_before_range_is_not_a_status() {
        let found = collect("Glucose 250 mg/dL Normal 70-100");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, None);

        let found = collect("Glucose 250 Normal 70-100");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unit, None);
        assert_eq!(found[0].status, None);
        assert_eq!(found[0].text, "Glucose 250");
    }

    #[test]
    fn test_closed_note_is_passed_through() {
        let found = collect("Glucose 250 mg/dL (see below)");
        assert_eq!(found[0].status, Some("see below"));
    }

    #[test]
    fn test_name_fused_to_value() {
        let found = collect("Hb10.2 g/dL (Low), Hemoglobin13 g/dL");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Hb");
        assert_eq!(found[0].value, "10.2");
        assert_eq!(found[0].unit, Some("g/dL"));
        assert_eq!(found[0].status, Some("Low"));
        assert_eq!(found[1].name, "Hemoglobin");
        assert_eq!(found[1].value, "13");
    }

    #[test]
    fn test_digits_inside_names_still_separate() {
        let found = collect("HbA1c 5.6 %\nVitamin B12 400 pg/mL");
        assert_eq!(found[0].name, "HbA1c");
        assert_eq!(found[0].value, "5.6");
        assert_eq!(found[1].name, "Vitamin B12");
        assert_eq!(found[1].value, "400");
    }

    #[test]
    fn test_fused_value_with_glued_unit_is_not_truncated() {
        assert!(collect("Hb10.2g/dL").iter().all(|f| f.value != "10"));
    }

    #[test]
    fn test_restartable() {
        let text = "Hb 10 g/dL, WBC 5000 /uL";
        assert_eq!(collect(text), collect(text));
    }
}
