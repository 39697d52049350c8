//! Page Templates
//!
//! Templates are read-mostly reference data. Each one declares the areas a
//! page layout exposes and the structured fields whose values live in a
//! page's `page_data`. Values are validated against the fields at edit time
//! only; the tree never enforces them.

use super::page::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value type of a template field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    RichText,
    Image,
    Select,
    Boolean,
}

/// Allowed choice for a `select` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Structured field declared by a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl TemplateField {
    pub fn new(id: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type,
            required: false,
            options: Vec::new(),
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(label, value)| SelectOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    /// Check a single value against this field's type
    ///
    /// `Null` is accepted for optional fields and rejected for required ones.
    pub fn check(&self, value: &Value) -> Result<(), ValidationError> {
        if value.is_null() {
            return if self.required {
                Err(ValidationError::MissingField(self.id.clone()))
            } else {
                Ok(())
            };
        }

        let ok = match self.field_type {
            FieldType::Text | FieldType::RichText | FieldType::Image => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Date => value
                .as_str()
                .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
                    || chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            FieldType::Select => {
                return match value.as_str() {
                    Some(s) if self.options.iter().any(|o| o.value == s) => Ok(()),
                    Some(s) => Err(self.invalid(format!("'{}' is not one of the options", s))),
                    None => Err(self.invalid("expected a string option".to_string())),
                };
            }
        };

        if ok {
            Ok(())
        } else {
            Err(self.invalid(format!("expected {:?} value", self.field_type)))
        }
    }

    fn invalid(&self, reason: String) -> ValidationError {
        ValidationError::InvalidFieldValue {
            field: self.id.clone(),
            reason,
        }
    }
}

/// Page layout template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub areas: Vec<String>,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            areas: vec!["header".to_string(), "main".to_string(), "footer".to_string()],
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<TemplateField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn field(&self, id: &str) -> Option<&TemplateField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Initial page data built from field defaults
    pub fn default_page_data(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.default_value.clone().map(|v| (f.id.clone(), v)))
            .collect()
    }

    /// Validate page data against every declared field
    ///
    /// Keys that no field declares are ignored. Returns every problem found,
    /// in field declaration order.
    pub fn validate_page_data(&self, data: &Map<String, Value>) -> Vec<ValidationError> {
        self.fields
            .iter()
            .filter_map(|field| field.check(data.get(&field.id).unwrap_or(&Value::Null)).err())
            .collect()
    }
}
