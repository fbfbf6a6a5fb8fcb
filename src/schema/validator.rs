//! Schema validation with detailed error reporting

use jsonschema::{validator_for, ValidationError as JsonSchemaError, Validator as JsonValidator};
use miette::{Diagnostic, NamedSource, SourceSpan};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;

use crate::core::project::CatalogKind;
use crate::schema::registry::SchemaRegistry;
use crate::yaml::diagnostics::offset_of;

/// Validation error with source location information
#[derive(Debug, Error, Diagnostic)]
#[error("Schema validation failed: {summary}")]
#[diagnostic(code(fct::schema::validation_error))]
pub struct ValidationError {
    summary: String,

    #[source_code]
    src: NamedSource<String>,

    #[related]
    violations: Vec<SchemaViolation>,
}

/// A single schema violation
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SchemaViolation {
    #[label("{}", self.hint)]
    span: SourceSpan,

    message: String,
    hint: String,

    #[help]
    help: Option<String>,
}

impl SchemaViolation {
    pub fn new(message: String, hint: String, span: SourceSpan, help: Option<String>) -> Self {
        Self {
            span,
            message,
            hint,
            help,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ValidationError {
    pub fn new(filename: &str, source: &str, violations: Vec<SchemaViolation>) -> Self {
        let count = violations.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{} errors", count)
        };
        Self {
            summary,
            src: NamedSource::new(filename, source.to_string()),
            violations,
        }
    }

    /// Get the number of violations
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn violations(&self) -> &[SchemaViolation] {
        &self.violations
    }
}

/// Schema validator with compiled schemas
pub struct Validator {
    compiled: HashMap<CatalogKind, JsonValidator>,
}

impl Validator {
    /// Create a new validator with schemas from the registry
    pub fn new(registry: &SchemaRegistry) -> Self {
        let mut compiled = HashMap::new();

        for kind in CatalogKind::all() {
            let Some(schema_str) = registry.get(*kind) else {
                continue;
            };
            match serde_json::from_str::<JsonValue>(schema_str)
                .map_err(|e| e.to_string())
                .and_then(|json| validator_for(&json).map_err(|e| e.to_string()))
            {
                Ok(validator) => {
                    compiled.insert(*kind, validator);
                }
                Err(e) => log::warn!("schema for {} does not compile: {}", kind, e),
            }
        }

        Self { compiled }
    }

    /// Validate YAML content against the schema for a catalog kind,
    /// collecting every violation
    pub fn validate(
        &self,
        content: &str,
        filename: &str,
        kind: CatalogKind,
    ) -> Result<(), ValidationError> {
        let yaml_value: serde_yml::Value = match serde_yml::from_str(content) {
            Ok(v) => v,
            Err(e) => {
                let span = find_error_span(content, e.location());
                let violation = SchemaViolation::new(
                    format!("YAML parse error: {}", e),
                    "invalid YAML".to_string(),
                    span,
                    Some("Check YAML syntax - proper indentation, colons, quotes".to_string()),
                );
                return Err(ValidationError::new(filename, content, vec![violation]));
            }
        };

        let json_value: JsonValue = match serde_json::to_value(&yaml_value) {
            Ok(v) => v,
            Err(e) => {
                let violation = SchemaViolation::new(
                    format!("Failed to convert YAML to JSON: {}", e),
                    "conversion error".to_string(),
                    (0, content.len()).into(),
                    None,
                );
                return Err(ValidationError::new(filename, content, vec![violation]));
            }
        };

        // No schema for this kind: nothing to check
        let Some(schema) = self.compiled.get(&kind) else {
            return Ok(());
        };

        let violations: Vec<SchemaViolation> = schema
            .iter_errors(&json_value)
            .map(|e| error_to_violation(content, &e))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(filename, content, violations))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&SchemaRegistry::default())
    }
}

fn error_to_violation(content: &str, error: &JsonSchemaError) -> SchemaViolation {
    let path = error.instance_path.to_string();
    let message = format_schema_error(error);
    let hint = format_error_hint(error);
    let help = generate_help_message(error);
    let span = find_path_span(content, &path);

    SchemaViolation::new(message, hint, span, help)
}

fn format_schema_error(error: &JsonSchemaError) -> String {
    use jsonschema::error::ValidationErrorKind as Kind;

    let path = if error.instance_path.as_str().is_empty() {
        "document root".to_string()
    } else {
        format!("'{}'", error.instance_path)
    };

    match &error.kind {
        Kind::Required { property } => {
            let prop = property
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| property.to_string());
            format!("Missing required field: {} at {}", prop, path)
        }
        Kind::Type { kind } => format!("Wrong type at {}: expected {:?}", path, kind),
        Kind::Enum { options } => format!(
            "Invalid value at {}: must be one of: {}",
            path,
            format_enum_options(options)
        ),
        Kind::Pattern { pattern } => {
            format!("Value at {} doesn't match pattern: {}", path, pattern)
        }
        Kind::Minimum { limit } => format!("Value at {} is too small: minimum {}", path, limit),
        Kind::MinLength { limit } => {
            format!("Value at {} is too short: minimum {} characters", path, limit)
        }
        Kind::AdditionalProperties { unexpected } => {
            format!("Unknown field(s) at {}: {}", path, unexpected.join(", "))
        }
        _ => format!("Validation error at {}: {}", path, error),
    }
}

fn format_enum_options(options: &JsonValue) -> String {
    match options.as_array() {
        Some(arr) => arr
            .iter()
            .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        None => options.to_string(),
    }
}

fn format_error_hint(error: &JsonSchemaError) -> String {
    use jsonschema::error::ValidationErrorKind as Kind;

    match &error.kind {
        Kind::Required { .. } => "required field missing",
        Kind::Type { .. } => "wrong type",
        Kind::Enum { .. } => "invalid value",
        Kind::Pattern { .. } => "pattern mismatch",
        Kind::AdditionalProperties { .. } => "unknown field",
        _ => "validation error",
    }
    .to_string()
}

fn generate_help_message(error: &JsonSchemaError) -> Option<String> {
    use jsonschema::error::ValidationErrorKind as Kind;

    match &error.kind {
        Kind::Required { property } => {
            let prop = property
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| property.to_string());
            Some(format!("Add the '{}' field to your file", prop))
        }
        Kind::Enum { options } => Some(format!("Valid values: {}", format_enum_options(options))),
        Kind::Pattern { pattern } if pattern.contains("[0-9A-HJKMNP-TV-Z]{26}") => Some(
            "IDs are a type prefix plus a 26-character ULID, e.g. AST-01HC2JB7SMQX7RS1Y0GFKBHPTD"
                .to_string(),
        ),
        Kind::Pattern { pattern } if pattern.contains("[a-z0-9_]") => {
            Some("Field ids are lower_snake_case, e.g. insulation_resistance".to_string())
        }
        Kind::AdditionalProperties { unexpected } if unexpected.len() == 1 => Some(format!(
            "Remove the '{}' field or check spelling",
            unexpected[0]
        )),
        Kind::AdditionalProperties { .. } => {
            Some("Remove unknown fields or check spelling".to_string())
        }
        _ => None,
    }
}

fn first_line_span(content: &str) -> SourceSpan {
    let len = content.find('\n').unwrap_or(content.len()).max(1);
    (0, len).into()
}

fn find_error_span(content: &str, location: Option<serde_yml::Location>) -> SourceSpan {
    let Some(loc) = location else {
        return first_line_span(content);
    };
    let offset = offset_of(content, loc.line(), loc.column()).min(content.len());
    let rest = &content[offset..];
    let len = rest.find('\n').unwrap_or(rest.len()).max(1);
    (offset, len).into()
}

/// Find the span for a JSON pointer (e.g. "/templates/0/fields/1/type")
fn find_path_span(content: &str, json_path: &str) -> SourceSpan {
    let parts: Vec<&str> = json_path.split('/').filter(|s| !s.is_empty()).collect();

    // Array indices have no key of their own; use the nearest named parent
    let key = parts.iter().rev().find(|p| p.parse::<usize>().is_err());
    match key {
        Some(key) => find_key_span(content, key).unwrap_or_else(|| first_line_span(content)),
        None => first_line_span(content),
    }
}

fn find_key_span(content: &str, key: &str) -> Option<SourceSpan> {
    let pattern = format!("{}:", key);

    let mut offset = 0;
    for line in content.lines() {
        let trimmed = line.trim_start().trim_start_matches("- ");
        if trimmed.starts_with(&pattern) {
            let indent = line.len() - trimmed.len();
            return Some((offset + indent, trimmed.len()).into());
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "id: AST-01HC2JB7SMQX7RS1Y0GFKBHPTD\nlabel: DB-1\nsite: depot\n";

    #[test]
    fn test_validator_compiles_every_schema() {
        let validator = Validator::default();
        for kind in CatalogKind::all() {
            assert!(validator.compiled.contains_key(kind), "{} missing", kind);
        }
    }

    #[test]
    fn test_valid_asset() {
        let validator = Validator::default();
        assert!(validator
            .validate(ASSET, "a.fct.yaml", CatalogKind::Asset)
            .is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let validator = Validator::default();
        let err = validator
            .validate("id: AST-01HC2JB7SMQX7RS1Y0GFKBHPTD\n", "a.fct.yaml", CatalogKind::Asset)
            .unwrap_err();
        // label and site
        assert_eq!(err.violation_count(), 2);
    }

    #[test]
    fn test_invalid_field_type() {
        let validator = Validator::default();
        let yaml = r#"
id: FORM-01HC2JB7SMQX7RS1Y0GFKBHPTD
title: Annual inspection
version_number: 1
templates:
  - id: TMPL-01HC2JB7SMQX7RS1Y0GFKBHPTE
    title: Circuit
    fields:
      - id: ir
        label: Insulation resistance
        type: decimal
"#;
        let err = validator
            .validate(yaml, "f.fct.yaml", CatalogKind::Form)
            .unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| v.message().contains("pass_fail")));
    }

    #[test]
    fn test_wrong_id_prefix_and_unknown_field() {
        let validator = Validator::default();
        let yaml = "id: MTR-01HC2JB7SMQX7RS1Y0GFKBHPTD\nlabel: DB-1\nsite: depot\ncolour: red\n";
        let err = validator
            .validate(yaml, "a.fct.yaml", CatalogKind::Asset)
            .unwrap_err();
        assert_eq!(err.violation_count(), 2);
    }

    #[test]
    fn test_yaml_syntax_error() {
        let validator = Validator::default();
        let err = validator
            .validate("label: [unclosed\n", "a.fct.yaml", CatalogKind::Asset)
            .unwrap_err();
        assert!(err.violations()[0].message().starts_with("YAML parse error"));
    }

    #[test]
    fn test_find_key_span_in_list_item() {
        let content = "templates:\n  - id: TMPL-X\n    title: A\n";
        let span = find_path_span(content, "/templates/0/id");
        assert_eq!(&content[span.offset()..span.offset() + 3], "id:");
    }
}
