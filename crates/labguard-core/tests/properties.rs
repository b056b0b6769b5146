//! Property tests for the report pipeline.

use labguard_core::{
    fragments, process_report, KnowledgeBase, NameResolver, ProcessError, ReasonCode, Status,
};
use proptest::prelude::*;

fn builtin() -> &'static KnowledgeBase {
    KnowledgeBase::builtin().unwrap()
}

/// One report line: either a real test with its canonical unit, or noise.
#[derive(Debug, Clone)]
enum Line {
    Known { index: usize, value: u32 },
    Unknown { value: u32 },
}

impl Line {
    fn render(&self, kb: &KnowledgeBase) -> String {
        match self {
            Line::Known { index, value } => {
                let test = &kb.tests()[*index];
                format!("{} {} {}", test.name, value, test.unit)
            }
            Line::Unknown { value } => format!("Xyzzy {} foo", value),
        }
    }
}

fn line_strategy() -> impl Strategy<Value = Line> {
    let count = builtin().tests().len();
    prop_oneof![
        3 => (0..count, 0u32..1_000_000).prop_map(|(index, value)| Line::Known { index, value }),
        1 => (0u32..1000).prop_map(|value| Line::Unknown { value }),
    ]
}

proptest! {
    #[test]
    fn processing_is_idempotent(text in "[A-Za-z0-9 .,:;()/\n-]{0,120}") {
        let kb = builtin();
        let first = process_report(kb, &text);
        let second = process_report(kb, &text);

        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(
                    serde_json::to_string(&a).unwrap(),
                    serde_json::to_string(&b).unwrap()
                );
            }
            (Err(ProcessError::InputEmpty), Err(ProcessError::InputEmpty)) => {}
            (a, b) => prop_assert!(false, "diverged: {:?} vs {:?}", a, b),
        }
    }

    #[test]
    fn every_fragment_is_accounted_for(text in "[A-Za-z0-9 .,:;()/\n-]{1,120}") {
        let kb = builtin();
        if let Ok(outcome) = process_report(kb, &text) {
            prop_assert_eq!(
                outcome.tests.len() + outcome.rejected.len(),
                fragments(&text).count()
            );
        }
    }

    #[test]
    fn output_follows_document_order(lines in prop::collection::vec(line_strategy(), 1..12)) {
        let kb = builtin();
        let text = lines.iter().map(|l| l.render(kb)).collect::<Vec<_>>().join("\n");
        let outcome = process_report(kb, &text).unwrap();

        let expected: Vec<&str> = lines
            .iter()
            .filter_map(|l| match l {
                Line::Known { index, .. } => Some(kb.tests()[*index].id.as_str()),
                Line::Unknown { .. } => None,
            })
            .collect();
        let actual: Vec<&str> = outcome.tests.iter().map(|t| t.id.as_str()).collect();
        prop_assert_eq!(actual, expected);

        let unknown = lines.iter().filter(|l| matches!(l, Line::Unknown { .. })).count();
        prop_assert_eq!(outcome.rejected.len(), unknown);
        prop_assert!(outcome.rejected.windows(2).all(|w| w[0].span.start < w[1].span.start));
    }

    #[test]
    fn values_inside_range_are_normal(index in 0usize..13, fraction in 0.0f64..=1.0) {
        let kb = builtin();
        let test = &kb.tests()[index % kb.tests().len()];
        let value = (test.range.low + fraction * (test.range.high - test.range.low))
            .clamp(test.range.low, test.range.high);
        let text = format!("{} {} {}", test.name, value, test.unit);

        let outcome = process_report(kb, &text).unwrap();
        prop_assert_eq!(outcome.tests.len(), 1);
        prop_assert_eq!(outcome.tests[0].status, Status::Normal);
    }

    #[test]
    fn unaccepted_units_are_always_rejected(
        index in 0usize..13,
        unit in prop::sample::select(vec!["mmol/L", "g/dL", "mg/dL", "/uL", "%", "IU/L", "ng/mL"]),
    ) {
        let kb = builtin();
        let test = &kb.tests()[index % kb.tests().len()];
        prop_assume!(!test.unit_keys().contains(&kb.canonical_unit_key(unit)));

        let text = format!("{} 42 {}", test.name, unit);
        let outcome = process_report(kb, &text).unwrap();
        prop_assert!(outcome.tests.is_empty());
        prop_assert_eq!(outcome.rejected.len(), 1);
        prop_assert_eq!(outcome.rejected[0].reason, ReasonCode::UnitInvalid);
    }

    #[test]
    fn text_without_digits_yields_empty_outcome(text in "[A-Za-z ,;:()\n]{0,80}") {
        let kb = builtin();
        match process_report(kb, &text) {
            Ok(outcome) => prop_assert!(outcome.is_extraction_empty()),
            Err(ProcessError::InputEmpty) => prop_assert!(text.trim().is_empty()),
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn single_substitution_resolves_long_names(
        id in prop::sample::select(vec![
            "hemoglobin", "platelets", "creatinine", "cholesterol", "triglycerides",
        ]),
        position in 0usize..8,
        replacement in "[a-z]",
    ) {
        let kb = builtin();
        let name = kb.get(id).unwrap().name.to_lowercase();
        let mut chars: Vec<char> = name.chars().collect();
        chars[position] = replacement.chars().next().unwrap();
        let mutated: String = chars.into_iter().collect();

        let resolver = NameResolver::new(kb, 80);
        let resolution = resolver.resolve(&mutated).unwrap();
        prop_assert_eq!(resolution.test.id.as_str(), id);
    }

    #[test]
    fn unrelated_words_stay_unresolved(word in "[q-z]{6,10}") {
        let kb = builtin();
        let resolver = NameResolver::new(kb, 80);
        prop_assert!(resolver.resolve(&word).is_err());
    }

    #[test]
    fn lowering_the_threshold_never_loses_a_match(
        token in "[a-z ]{1,14}",
        high in 1u8..=100,
        drop in 0u8..=50,
    ) {
        let kb = builtin();
        let low = high.saturating_sub(drop).max(1);
        if let Ok(strict) = NameResolver::new(kb, high).resolve(&token) {
            let lenient = NameResolver::new(kb, low).resolve(&token);
            prop_assert_eq!(
                lenient.map(|r| r.test.id.as_str()).ok(),
                Some(strict.test.id.as_str())
            );
        }
    }
}

#[test]
fn range_bounds_are_inclusive() {
    let kb = builtin();
    for test in kb.tests() {
        for bound in [test.range.low, test.range.high] {
            let text = format!("{} {} {}", test.name, bound, test.unit);
            let outcome = process_report(kb, &text).unwrap();
            assert_eq!(outcome.tests.len(), 1, "{}", text);
            assert_eq!(outcome.tests[0].status, Status::Normal, "{}", text);
        }
    }
}
