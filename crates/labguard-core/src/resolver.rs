//! Name resolution against the knowledge base.
//!
//! Exact matches on normalized names and aliases are tried first. Otherwise
//! every name and alias is scored with normalized Levenshtein similarity
//! (0-100) and the best one is accepted if it meets the threshold.

use thiserror::Error;

use crate::knowledge::{normalize_name, CanonicalTest, KnowledgeBase, MatchKey};

/// Default minimum similarity for a fuzzy match.
pub const DEFAULT_MATCH_THRESHOLD: u8 = 80;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NameError {
    #[error("test name is empty")]
    Empty,

    #[error("no known test matches (closest: {}, score {score})", .best.as_deref().unwrap_or("none"))]
    Unresolved { best: Option<String>, score: u8 },

    #[error("name matches several tests equally (score {score}): {}", .candidates.join(", "))]
    Ambiguous { candidates: Vec<String>, score: u8 },
}

/// A successfully resolved name.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'kb> {
    pub test: &'kb CanonicalTest,

    /// The normalized name or alias that matched
    pub matched: &'kb str,

    /// Similarity score, 100 for exact matches
    pub score: u8,

    pub exact: bool,
}

/// Similarity of two normalized names on a 0-100 scale.
pub fn similarity(a: &str, b: &str) -> u8 {
    (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
}

pub struct NameResolver<'kb> {
    kb: &'kb KnowledgeBase,
    threshold: u8,
}

impl<'kb> NameResolver<'kb> {
    pub fn new(kb: &'kb KnowledgeBase, threshold: u8) -> Self {
        Self { kb, threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Resolve a raw name token to a canonical test.
    pub fn resolve(&self, raw: &str) -> Result<Resolution<'kb>, NameError> {
        let normalized = normalize_name(raw);
        if normalized.is_empty() {
            return Err(NameError::Empty);
        }

        if let Some(key) = self.kb.lookup_exact(&normalized) {
            if let Some(test) = self.kb.test_at(key.test_index) {
                return Ok(Resolution {
                    test,
                    matched: &key.key,
                    score: 100,
                    exact: true,
                });
            }
        }

        let (score, tied) = self.best_candidates(&normalized);
        if tied.is_empty() || score < self.threshold {
            return Err(NameError::Unresolved {
                best: tied.first().map(|k| k.key.clone()),
                score,
            });
        }

        match self.break_tie(&tied) {
            Some(key) => match self.kb.test_at(key.test_index) {
                Some(test) => Ok(Resolution {
                    test,
                    matched: &key.key,
                    score,
                    exact: false,
                }),
                None => Err(NameError::Unresolved {
                    best: Some(key.key.clone()),
                    score,
                }),
            },
            None => {
                let mut candidates: Vec<String> = Vec::new();
                for key in &tied {
                    if let Some(test) = self.kb.test_at(key.test_index) {
                        if !candidates.contains(&test.id) {
                            candidates.push(test.id.clone());
                        }
                    }
                }
                Err(NameError::Ambiguous { candidates, score })
            }
        }
    }

    /// All keys sharing the maximum similarity, in knowledge base order.
    fn best_candidates(&self, normalized: &str) -> (u8, Vec<&'kb MatchKey>) {
        let mut best = 0;
        let mut tied = Vec::new();

        for key in self.kb.match_keys() {
            let score = similarity(normalized, &key.key);
            if score == 0 {
                continue;
            }
            if score > best {
                best = score;
                tied.clear();
                tied.push(key);
            } else if score == best {
                tied.push(key);
            }
        }

        (best, tied)
    }

    /// Pick a single key among equally scored candidates.
    ///
    /// Keys of one test resolve to that test. Across tests, a unique
    /// primary-name match wins; anything else stays unresolved.
    fn break_tie(&self, tied: &[&'kb MatchKey]) -> Option<&'kb MatchKey> {
        let first = tied.first()?;

        if tied.iter().all(|k| k.test_index == first.test_index) {
            return Some(tied.iter().find(|k| k.primary).copied().unwrap_or(*first));
        }

        let mut primaries = tied.iter().filter(|k| k.primary);
        match (primaries.next(), primaries.next()) {
            (Some(key), None) => Some(*key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: &str = r#"
kb_version: "1.0"
name: "Resolver fixtures"
tests:
  - id: hemoglobin
    name: Hemoglobin
    aliases: [hb, hgb]
    unit: g/dL
    range: { low: 12, high: 15 }
  - id: alpha
    name: Abcd
    unit: mg/dL
    range: { low: 1, high: 2 }
  - id: beta
    name: Wxyz
    aliases: [Abce]
    unit: mg/dL
    range: { low: 1, high: 2 }
  - id: gamma
    name: Abcf
    unit: mg/dL
    range: { low: 1, high: 2 }
"#;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::from_yaml(KB).unwrap()
    }

    #[test]
    fn test_exact_match_is_case_insensitive() {
        let kb = kb();
        let resolver = NameResolver::new(&kb, DEFAULT_MATCH_THRESHOLD);
        let resolution = resolver.resolve("  HGB ").unwrap();
        assert_eq!(resolution.test.id, "hemoglobin");
        assert!(resolution.exact);
        assert_eq!(resolution.score, 100);
    }

    #[test]
    fn test_fuzzy_match_corrects_typo() {
        let kb = kb();
        let resolver = NameResolver::new(&kb, DEFAULT_MATCH_THRESHOLD);
        let resolution = resolver.resolve("Hemglobin").unwrap();
        assert_eq!(resolution.test.id, "hemoglobin");
        assert_eq!(resolution.matched, "hemoglobin");
        assert!(!resolution.exact);
        assert_eq!(resolution.score, 90);
    }

    #[test]
    fn test_unrelated_word_unresolved() {
        let kb = kb();
        let resolver = NameResolver::new(&kb, DEFAULT_MATCH_THRESHOLD);
        assert!(matches!(
            resolver.resolve("Xyzzy"),
            Err(NameError::Unresolved { .. })
        ));
        assert_eq!(resolver.resolve("--").unwrap_err(), NameError::Empty);
    }

    #[test]
    fn test_tie_between_two_primaries_is_ambiguous() {
        // "abcx" is one edit from "abcd" (primary) and "abce" (alias)
        // and from "abcf" (primary): two primaries tie, so it is ambiguous.
        let kb = kb();
        let resolver = NameResolver::new(&kb, 70);
        assert!(matches!(
            resolver.resolve("abcx"),
            Err(NameError::Ambiguous { ref candidates, score: 75 }) if candidates.len() == 3
        ));
    }

    #[test]
    fn test_tie_between_primary_and_alias() {
        let yaml = r#"
kb_version: "1.0"
name: "Tie"
tests:
  - { id: alpha, name: Abcd, unit: mg/dL, range: { low: 1, high: 2 } }
  - { id: beta, name: Wxyz, aliases: [Abce], unit: mg/dL, range: { low: 1, high: 2 } }
"#;
        let kb = KnowledgeBase::from_yaml(yaml).unwrap();
        let resolver = NameResolver::new(&kb, 70);
        let resolution = resolver.resolve("abcx").unwrap();
        assert_eq!(resolution.test.id, "alpha");
        assert_eq!(resolution.score, 75);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kb = kb();
        assert!(NameResolver::new(&kb, 90).resolve("Hemglobin").is_ok());
        assert!(NameResolver::new(&kb, 91).resolve("Hemglobin").is_err());
    }

    #[test]
    fn test_similarity_scale() {
        assert_eq!(similarity("glucose", "glucose"), 100);
        assert_eq!(similarity("abcd", "wxyz"), 0);
    }
}
