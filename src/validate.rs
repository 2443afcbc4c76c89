// src/validate.rs

//! Property bag validation against per-type JSON Schemas (Draft-07)
//!
//! Types may carry a JSON Schema; a null schema accepts any document.
//! Validation failures report a JSON Pointer to the failing location,
//! a human-readable message, and the schema keyword that rejected it.

use crate::error::{Error, Result};
use jsonschema::{Draft, ValidationError, Validator};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A single validation failure
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON Pointer to the failing location ("" is the document root)
    pub path: String,
    pub message: String,
    /// Schema keyword that produced the failure
    pub keyword: String,
}

/// Outcome of validating a property document
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Convert a failed report into the store error
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::SchemaValidationFailed(self.errors))
        }
    }
}

/// Compile a schema document in Draft-07 mode
///
/// Used at type-creation time so malformed schemas are rejected up front,
/// and again when validating property bags.
pub fn compile_schema(schema: &Value) -> Result<Validator> {
    jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(schema)
        .map_err(|e| Error::validation("json_schema", format!("Invalid JSON Schema: {}", e)))
}

/// Reject ids that are not UUID-shaped before any lookup runs
///
/// Row ids are always generated as UUIDs, so a malformed handle is a
/// caller error, not a missing chain.
pub fn validate_resource_id(field: &str, id: &str) -> Result<()> {
    if Uuid::parse_str(id).is_ok() {
        Ok(())
    } else {
        Err(Error::validation(
            field,
            format!("{} is not a UUID-shaped identifier", id),
        ))
    }
}

/// Validate a property document against an optional schema text
///
/// A `None` schema succeeds unconditionally.
pub fn validate_properties(schema_text: Option<&str>, properties: &Value) -> Result<ValidationReport> {
    let Some(schema_text) = schema_text else {
        return Ok(ValidationReport::ok());
    };

    let schema: Value = serde_json::from_str(schema_text)?;
    let validator = compile_schema(&schema)?;

    let errors: Vec<ValidationIssue> = validator
        .iter_errors(properties)
        .map(|err| issue_from_error(&err))
        .collect();

    Ok(ValidationReport {
        valid: errors.is_empty(),
        errors,
    })
}

fn issue_from_error(err: &ValidationError<'_>) -> ValidationIssue {
    ValidationIssue {
        path: err.instance_path.to_string(),
        message: err.to_string(),
        keyword: keyword_for(err),
    }
}

/// Map the library's error kind back to the schema keyword
fn keyword_for(err: &ValidationError<'_>) -> String {
    use jsonschema::error::ValidationErrorKind as Kind;

    let keyword = match &err.kind {
        Kind::AdditionalProperties { .. } => "additionalProperties",
        Kind::AdditionalItems { .. } => "additionalItems",
        Kind::AnyOf => "anyOf",
        Kind::Constant { .. } => "const",
        Kind::Contains => "contains",
        Kind::Enum { .. } => "enum",
        Kind::ExclusiveMaximum { .. } => "exclusiveMaximum",
        Kind::ExclusiveMinimum { .. } => "exclusiveMinimum",
        Kind::Format { .. } => "format",
        Kind::Maximum { .. } => "maximum",
        Kind::Minimum { .. } => "minimum",
        Kind::MaxItems { .. } => "maxItems",
        Kind::MinItems { .. } => "minItems",
        Kind::MaxLength { .. } => "maxLength",
        Kind::MinLength { .. } => "minLength",
        Kind::MaxProperties { .. } => "maxProperties",
        Kind::MinProperties { .. } => "minProperties",
        Kind::MultipleOf { .. } => "multipleOf",
        Kind::Not { .. } => "not",
        Kind::OneOfMultipleValid => "oneOf",
        Kind::OneOfNotValid => "oneOf",
        Kind::Pattern { .. } => "pattern",
        Kind::PropertyNames { .. } => "propertyNames",
        Kind::Required { .. } => "required",
        Kind::Type { .. } => "type",
        Kind::UniqueItems => "uniqueItems",
        _ => "schema",
    };
    keyword.to_string()
}
