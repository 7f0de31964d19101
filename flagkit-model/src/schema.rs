//! Structural validation of JSON flag documents.
//!
//! Decoding is lenient (bad biases are replaced, unknown keys ignored). This
//! is the strict check tooling runs before a document ships.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::{ModelError, ModelResult};

/// Embedded schema every JSON flag document must satisfy
const FLAGS_SCHEMA_JSON: &str = include_str!("flags-schema.json");

pub struct DocumentValidator {
    validator: jsonschema::Validator,
}

impl DocumentValidator {
    pub fn new() -> ModelResult<Self> {
        let schema: Value = serde_json::from_str(FLAGS_SCHEMA_JSON)?;
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| ModelError::Schema(format!("Failed to compile flags schema: {e}")))?;
        Ok(Self { validator })
    }

    /// Validate a parsed document, collecting every error.
    pub fn validate(&self, document: &Value) -> ModelResult<()> {
        let output = self.validator.evaluate(document);

        if output.flag().valid {
            return Ok(());
        }

        let errors: Vec<String> = output
            .iter_errors()
            .map(|e| format!("Error: {}", e.error))
            .collect();
        Err(ModelError::Schema(format!(
            "Document validation failed:\n{}",
            errors.join("\n")
        )))
    }

    pub fn validate_file(&self, path: &Path) -> ModelResult<Value> {
        let file = fs::File::open(path)?;
        let document: Value = serde_json::from_reader(file)?;
        self.validate(&document)?;
        Ok(document)
    }
}
