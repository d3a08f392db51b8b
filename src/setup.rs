//! Setup Wizard Types
//!
//! Skills with `has_setup` drive a multi-step form the host renders:
//! `skill/setupStart` returns the first step, each `skill/setupSubmit`
//! answers with the next step, field errors, or completion, and
//! `skill/setupCancel` lets the skill clean up.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of the wizard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupStep {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<SetupField>,
}

impl SetupStep {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_field(mut self, field: SetupField) -> Self {
        self.fields.push(field);
        self
    }
}

/// Input widget kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupFieldType {
    Text,
    Number,
    Boolean,
    Select,
    Multiselect,
    Password,
}

/// Choice for select/multiselect fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupFieldOption {
    pub label: String,
    pub value: String,
}

/// A single form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: SetupFieldType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SetupFieldOption>,
}

fn default_required() -> bool {
    true
}

impl SetupField {
    pub fn new(name: &str, field_type: SetupFieldType, label: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            label: label.to_string(),
            description: None,
            required: true,
            default: None,
            placeholder: None,
            options: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn with_option(mut self, label: &str, value: &str) -> Self {
        self.options.push(SetupFieldOption {
            label: label.to_string(),
            value: value.to_string(),
        });
        self
    }
}

/// Validation failure attached to one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupFieldError {
    pub field: String,
    pub message: String,
}

/// Where the wizard goes after a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    /// Show `next_step`
    Next,
    /// Show field errors, stay on the current step
    Error,
    /// Setup is done
    Complete,
}

/// Answer to `skill/setupSubmit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResult {
    pub status: SetupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<SetupStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SetupFieldError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SetupResult {
    pub fn next(step: SetupStep) -> Self {
        Self {
            status: SetupStatus::Next,
            next_step: Some(step),
            errors: Vec::new(),
            message: None,
        }
    }

    pub fn field_error(field: &str, message: &str) -> Self {
        Self {
            status: SetupStatus::Error,
            next_step: None,
            errors: vec![SetupFieldError {
                field: field.to_string(),
                message: message.to_string(),
            }],
            message: None,
        }
    }

    pub fn complete(message: Option<String>) -> Self {
        Self {
            status: SetupStatus::Complete,
            next_step: None,
            errors: Vec::new(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_result_wire_shape() {
        let result = SetupResult::next(SetupStep::new("notifications", "Notifications"));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "next");
        assert_eq!(value["nextStep"]["id"], "notifications");
        assert!(value.get("errors").is_none());
    }

    #[test]
    fn test_field_error_shape() {
        let value = serde_json::to_value(SetupResult::field_error("username", "Required")).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["errors"], json!([{"field": "username", "message": "Required"}]));
    }

    #[test]
    fn test_field_serialization() {
        let field = SetupField::new("experience", SetupFieldType::Select, "Experience")
            .with_option("Beginner", "beginner")
            .optional();
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(value["type"], "select");
        assert_eq!(value["required"], false);
        assert_eq!(value["options"][0]["value"], "beginner");
    }
}
