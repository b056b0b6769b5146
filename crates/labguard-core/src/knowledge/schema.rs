//! JSON Schema validation for knowledge bases.
//!
//! Knowledge base documents are validated against
//! schema/knowledge_base.schema.json before they are trusted.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded knowledge base schema (loaded at compile time).
const KNOWLEDGE_BASE_SCHEMA_JSON: &str =
    include_str!("../../../../schema/knowledge_base.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(KNOWLEDGE_BASE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// Validate a knowledge base document against the schema.
///
/// Returns every violation, each suffixed with the offending instance path.
pub fn validate_knowledge_base_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a knowledge base document is valid against the schema.
pub fn is_valid_knowledge_base(document: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(document))
        .unwrap_or(false)
}
