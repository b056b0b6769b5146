//! Knowledge base parsing and validation.
//!
//! The knowledge base is structured data validated against JSON Schema.
//! It is loaded once and then shared read-only by every request.

mod parser;
mod schema;

pub use parser::{
    normalize_name, unit_key, CanonicalTest, CriticalBand, Explanations, KnowledgeBase,
    KnowledgeBaseError, MatchKey, ReferenceRange,
};
pub use schema::{is_valid_knowledge_base, validate_knowledge_base_schema};
