//! Form versions, entity templates and field definitions
//!
//! A [`FormVersion`] is the declarative test template published by the
//! template catalog. It is immutable once published: the engine only reads it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::entity::Entity;
use crate::core::identity::EntityId;

/// Type of value a field captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Select,
    PassFail,
}

impl FieldType {
    /// Whether thresholds are meaningful for this type
    pub fn supports_thresholds(&self) -> bool {
        matches!(self, FieldType::Number)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Number => write!(f, "number"),
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Select => write!(f, "select"),
            FieldType::PassFail => write!(f, "pass_fail"),
        }
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "boolean" => Ok(FieldType::Boolean),
            "select" => Ok(FieldType::Select),
            "pass_fail" => Ok(FieldType::PassFail),
            _ => Err(format!("Unknown field type: {}", s)),
        }
    }
}

/// Schema for one captured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Key of the field within its template (answers are keyed by this)
    pub id: String,

    /// Label shown to the operator
    pub label: String,

    /// Value type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Must be filled in once the instance has been started
    #[serde(default)]
    pub required: bool,

    /// Unit of measurement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Lower acceptable bound (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_threshold: Option<f64>,

    /// Upper acceptable bound (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_threshold: Option<f64>,

    /// Allowed values for select fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type,
            required: false,
            unit: None,
            pass_threshold: None,
            fail_threshold: None,
            options: Vec::new(),
        }
    }

    /// Set the acceptable band; either bound may be open
    pub fn with_band(mut self, pass_threshold: Option<f64>, fail_threshold: Option<f64>) -> Self {
        self.pass_threshold = pass_threshold;
        self.fail_threshold = fail_threshold;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Human-readable band, e.g. "10 .. 20 MΩ"
    pub fn band_display(&self) -> Option<String> {
        if self.pass_threshold.is_none() && self.fail_threshold.is_none() {
            return None;
        }
        let lower = self
            .pass_threshold
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-∞".to_string());
        let upper = self
            .fail_threshold
            .map(|v| v.to_string())
            .unwrap_or_else(|| "+∞".to_string());
        let unit = self
            .unit
            .as_deref()
            .map(|u| format!(" {}", u))
            .unwrap_or_default();
        Some(format!("{} .. {}{}", lower, upper, unit))
    }
}

/// A named group of fields, optionally repeated once per asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub id: EntityId,

    pub title: String,

    /// Fan out into one instance per applicable asset
    #[serde(default)]
    pub repeat_per_asset: bool,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl EntityTemplate {
    /// Look up a field by its key
    pub fn field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    /// First numeric field, used when a reading names no field
    pub fn primary_numeric_field(&self) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Number)
    }
}

/// A published, versioned set of templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormVersion {
    pub id: EntityId,

    /// Name of the form this is a version of
    pub title: String,

    pub version_number: u32,

    #[serde(default)]
    pub templates: Vec<EntityTemplate>,
}

impl Entity for FormVersion {
    const PREFIX: &'static str = "FORM";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Severity of a form definition problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Error,
    Warning,
}

/// A problem found in a form definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormIssue {
    pub level: IssueLevel,
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for FormIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl FormVersion {
    /// Look up a template by ID
    pub fn template(&self, template_id: &EntityId) -> Option<&EntityTemplate> {
        self.templates.iter().find(|t| &t.id == template_id)
    }

    /// Templates that fan out per asset
    pub fn repeating_templates(&self) -> impl Iterator<Item = &EntityTemplate> {
        self.templates.iter().filter(|t| t.repeat_per_asset)
    }

    /// Semantic checks that a JSON schema cannot express
    pub fn check(&self) -> Vec<FormIssue> {
        let mut issues = Vec::new();
        let mut template_ids = HashSet::new();

        for (ti, template) in self.templates.iter().enumerate() {
            let tpath = format!("templates[{}]", ti);
            if !template_ids.insert(&template.id) {
                issues.push(FormIssue {
                    level: IssueLevel::Error,
                    path: tpath.clone(),
                    message: format!("duplicate template id {}", template.id),
                });
            }

            let mut field_ids = HashSet::new();
            for (fi, field) in template.fields.iter().enumerate() {
                let fpath = format!("{}.fields[{}]", tpath, fi);
                if !field_ids.insert(field.id.as_str()) {
                    issues.push(FormIssue {
                        level: IssueLevel::Error,
                        path: fpath.clone(),
                        message: format!("duplicate field id '{}'", field.id),
                    });
                }

                let has_band = field.pass_threshold.is_some() || field.fail_threshold.is_some();
                if has_band && !field.field_type.supports_thresholds() {
                    issues.push(FormIssue {
                        level: IssueLevel::Error,
                        path: fpath.clone(),
                        message: format!(
                            "thresholds are only valid on number fields (field is {})",
                            field.field_type
                        ),
                    });
                }

                if let (Some(lower), Some(upper)) = (field.pass_threshold, field.fail_threshold) {
                    if lower > upper {
                        issues.push(FormIssue {
                            level: IssueLevel::Error,
                            path: fpath.clone(),
                            message: format!(
                                "pass_threshold {} is above fail_threshold {}; no value can pass",
                                lower, upper
                            ),
                        });
                    }
                }

                if field.field_type == FieldType::Select && field.options.is_empty() {
                    issues.push(FormIssue {
                        level: IssueLevel::Warning,
                        path: fpath,
                        message: "select field has no options".to_string(),
                    });
                }
            }
        }

        issues
    }
}
