//! JSON Schema input validation.
//!
//! Request input is checked against the resolved version's `input_schema`
//! (draft 2020-12), then stripped of undeclared top-level properties so that
//! inputs differing only in ignored fields share a cache entry.

use serde_json::Value;
use tessera_core::ValidationError;
use tessera_lifecycle::{strip_undeclared_properties, InputValidator};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    fn compile(schema: &Value) -> Result<jsonschema::Validator, ValidationError> {
        jsonschema::draft202012::new(schema).map_err(|e| ValidationError::InvalidSchema {
            reason: e.to_string(),
        })
    }
}

impl InputValidator for JsonSchemaValidator {
    fn check_schema(&self, schema: &Value) -> Result<(), ValidationError> {
        Self::compile(schema).map(|_| ())
    }

    fn validate(&self, schema: &Value, input: &Value) -> Result<Value, ValidationError> {
        let compiled = Self::compile(schema)?;
        let errors: Vec<String> = compiled
            .iter_errors(input)
            .map(|e| format!("{}: {}", e.instance_path(), e))
            .collect();
        if !errors.is_empty() {
            return Err(ValidationError::InputSchemaViolation { errors });
        }
        Ok(strip_undeclared_properties(schema, input))
    }
}
