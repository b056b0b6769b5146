//! Knowledge base parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::Status;

/// Built-in knowledge base (embedded at compile time).
const BUILTIN_KNOWLEDGE_BASE_YAML: &str = include_str!("../../../../data/knowledge_base.yaml");

/// Parsed built-in knowledge base (initialized once, reused).
static BUILTIN: OnceLock<Result<KnowledgeBase, String>> = OnceLock::new();

/// Errors that can occur when loading a knowledge base.
#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    #[error("Failed to read knowledge base file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Knowledge base validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Built-in knowledge base is invalid: {0}")]
    Builtin(String),
}

/// Inclusive [low, high] band defining a Normal result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub low: f64,
    pub high: f64,
}

impl ReferenceRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Values beyond these bounds are critical. Either side may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CriticalBand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
}

impl CriticalBand {
    /// True when the value falls strictly beyond either bound.
    pub fn is_critical(&self, value: f64) -> bool {
        self.low.is_some_and(|low| value < low) || self.high.is_some_and(|high| value > high)
    }
}

/// Status-keyed explanation templates.
///
/// A template may contain `{name}`; otherwise the display name is prefixed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Explanations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<String>,
}

impl Explanations {
    pub fn get(&self, status: Status) -> Option<&str> {
        match status {
            Status::Low => self.low.as_deref(),
            Status::Normal => self.normal.as_deref(),
            Status::High => self.high.as_deref(),
            Status::Critical => self.critical.as_deref(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &String)> {
        [
            ("low", self.low.as_ref()),
            ("normal", self.normal.as_ref()),
            ("high", self.high.as_ref()),
            ("critical", self.critical.as_ref()),
        ]
        .into_iter()
        .filter_map(|(key, text)| text.map(|t| (key, t)))
    }
}

/// A canonical lab test identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTest {
    /// Stable identifier (e.g., "hemoglobin")
    pub id: String,

    /// Display name, also the primary name for matching
    pub name: String,

    /// Alternative names used for matching
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Canonical unit, used in every result
    pub unit: String,

    /// Additional spellings that mean exactly the canonical unit
    #[serde(default)]
    pub accepted_units: Vec<String>,

    pub range: ReferenceRange,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<CriticalBand>,

    #[serde(default)]
    pub explanations: Explanations,

    /// Normalized unit keys (canonical first), filled during validation
    #[serde(skip)]
    unit_keys: Vec<String>,
}

impl CanonicalTest {
    /// Normalized keys of every accepted unit, canonical unit first.
    pub fn unit_keys(&self) -> &[String] {
        &self.unit_keys
    }

    /// Every accepted unit spelling, canonical first.
    pub fn all_units(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.unit.as_str()).chain(self.accepted_units.iter().map(String::as_str))
    }
}

/// A name or alias the resolver can match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchKey {
    /// Normalized text
    pub key: String,

    /// Index of the owning test in `KnowledgeBase::tests()`
    pub test_index: usize,

    /// True for the test's display name, false for aliases
    pub primary: bool,
}

/// Canonical lab tests with aliases, units, ranges and explanation templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Version of this knowledge base (semver)
    pub kb_version: String,

    /// Human-readable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Unit spelling -> accepted spelling, applied after unit-key normalization
    #[serde(default)]
    pub unit_synonyms: BTreeMap<String, String>,

    pub tests: Vec<CanonicalTest>,

    #[serde(skip)]
    match_keys: Vec<MatchKey>,

    #[serde(skip)]
    exact: HashMap<String, usize>,

    #[serde(skip)]
    synonyms: HashMap<String, String>,
}

impl KnowledgeBase {
    /// Parse a knowledge base from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, KnowledgeBaseError> {
        let kb: KnowledgeBase = serde_yaml::from_str(yaml)?;
        kb.prepare()
    }

    /// Parse a knowledge base from JSON string.
    pub fn from_json(json: &str) -> Result<Self, KnowledgeBaseError> {
        let kb: KnowledgeBase = serde_json::from_str(json)?;
        kb.prepare()
    }

    /// Parse a knowledge base from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, KnowledgeBaseError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a knowledge base from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, KnowledgeBaseError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// The knowledge base shipped with the crate.
    pub fn builtin() -> Result<&'static KnowledgeBase, KnowledgeBaseError> {
        let result = BUILTIN.get_or_init(|| {
            KnowledgeBase::from_yaml(BUILTIN_KNOWLEDGE_BASE_YAML).map_err(|e| e.to_string())
        });

        match result {
            Ok(kb) => Ok(kb),
            Err(e) => Err(KnowledgeBaseError::Builtin(e.clone())),
        }
    }

    /// Raw YAML source of the built-in knowledge base.
    pub fn builtin_source() -> &'static str {
        BUILTIN_KNOWLEDGE_BASE_YAML
    }

    pub fn tests(&self) -> &[CanonicalTest] {
        &self.tests
    }

    /// Look up a test by identifier.
    pub fn get(&self, id: &str) -> Option<&CanonicalTest> {
        self.tests.iter().find(|t| t.id == id)
    }

    /// Test at `index` in document order.
    pub fn test_at(&self, index: usize) -> Option<&CanonicalTest> {
        self.tests.get(index)
    }

    /// Every primary name and alias, in document order.
    pub fn match_keys(&self) -> &[MatchKey] {
        &self.match_keys
    }

    /// Exact lookup of an already-normalized name or alias.
    pub fn lookup_exact(&self, normalized: &str) -> Option<&MatchKey> {
        self.exact.get(normalized).map(|&i| &self.match_keys[i])
    }

    /// Normalize a raw unit token and map it through the synonym table.
    pub fn canonical_unit_key(&self, raw: &str) -> String {
        let key = unit_key(raw);
        match self.synonyms.get(&key) {
            Some(mapped) => mapped.clone(),
            None => key,
        }
    }

    /// Validate the structure and build lookup indexes.
    fn prepare(mut self) -> Result<Self, KnowledgeBaseError> {
        self.validate()?;

        self.synonyms = self
            .unit_synonyms
            .iter()
            .map(|(from, to)| (unit_key(from), unit_key(to)))
            .collect();

        self.build_unit_keys()?;
        self.build_match_keys()?;

        Ok(self)
    }

    /// Check required fields, ranges and explanations.
    fn validate(&self) -> Result<(), KnowledgeBaseError> {
        if self.name.trim().is_empty() {
            return Err(KnowledgeBaseError::MissingField("name".to_string()));
        }

        if self.tests.is_empty() {
            return Err(KnowledgeBaseError::MissingField("tests".to_string()));
        }

        let mut seen_ids = std::collections::HashSet::new();

        for (i, test) in self.tests.iter().enumerate() {
            if test.id.trim().is_empty() {
                return Err(KnowledgeBaseError::MissingField(format!("tests[{}].id", i)));
            }
            if !seen_ids.insert(test.id.as_str()) {
                return Err(KnowledgeBaseError::ValidationError(format!(
                    "Duplicate test ID: {}",
                    test.id
                )));
            }
            if test.name.trim().is_empty() {
                return Err(KnowledgeBaseError::MissingField(format!("tests[{}].name", i)));
            }
            if test.unit.trim().is_empty() {
                return Err(KnowledgeBaseError::MissingField(format!("tests[{}].unit", i)));
            }

            let range = test.range;
            if !range.low.is_finite() || !range.high.is_finite() || range.low > range.high {
                return Err(KnowledgeBaseError::ValidationError(format!(
                    "Invalid reference range for {}: [{}, {}]",
                    test.id, range.low, range.high
                )));
            }

            if let Some(critical) = test.critical {
                if critical.low.is_some_and(|low| !low.is_finite() || low > range.low)
                    || critical.high.is_some_and(|high| !high.is_finite() || high < range.high)
                {
                    return Err(KnowledgeBaseError::ValidationError(format!(
                        "Critical band for {} must lie outside the reference range",
                        test.id
                    )));
                }
            }

            for (status, text) in test.explanations.iter() {
                if text.trim().is_empty() {
                    return Err(KnowledgeBaseError::ValidationError(format!(
                        "Empty {} explanation for {}",
                        status, test.id
                    )));
                }
            }
        }

        Ok(())
    }

    fn build_unit_keys(&mut self) -> Result<(), KnowledgeBaseError> {
        for i in 0..self.tests.len() {
            let mut keys: Vec<String> = Vec::new();

            for unit in self.tests[i].all_units() {
                let key = self.canonical_unit_key(unit);
                if keys.contains(&key) {
                    return Err(KnowledgeBaseError::ValidationError(format!(
                        "Unit '{}' of {} duplicates another accepted unit",
                        unit, self.tests[i].id
                    )));
                }
                keys.push(key);
            }

            self.tests[i].unit_keys = keys;
        }

        Ok(())
    }

    fn build_match_keys(&mut self) -> Result<(), KnowledgeBaseError> {
        let mut match_keys = Vec::new();
        let mut exact: HashMap<String, usize> = HashMap::new();

        for (test_index, test) in self.tests.iter().enumerate() {
            let names = std::iter::once((test.name.as_str(), true))
                .chain(test.aliases.iter().map(|a| (a.as_str(), false)));

            for (name, primary) in names {
                let key = normalize_name(name);
                if key.is_empty() {
                    return Err(KnowledgeBaseError::ValidationError(format!(
                        "Empty name or alias for {}",
                        test.id
                    )));
                }

                if let Some(&existing) = exact.get(&key) {
                    let owner: &MatchKey = &match_keys[existing];
                    if owner.test_index == test_index {
                        // Alias repeats a name of the same test
                        continue;
                    }
                    return Err(KnowledgeBaseError::ValidationError(format!(
                        "Name '{}' is claimed by both {} and {}",
                        key, self.tests[owner.test_index].id, test.id
                    )));
                }

                exact.insert(key.clone(), match_keys.len());
                match_keys.push(MatchKey {
                    key,
                    test_index,
                    primary,
                });
            }
        }

        self.match_keys = match_keys;
        self.exact = exact;
        Ok(())
    }
}

/// Normalize a test name for matching: lowercase, collapsed whitespace,
/// no leading/trailing punctuation other than parentheses.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '(' && c != ')')
        .to_lowercase()
}

/// Normalize a unit token: lowercase, no whitespace, micro sign as `u`.
pub fn unit_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'µ' || c == 'μ' { 'u' } else { c })
        .collect()
}
