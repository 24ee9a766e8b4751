use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Collected answers keyed by question id. A later write for the same id
/// overwrites; entries are never pruned when a branch hides a question.
pub type AnswerMap = BTreeMap<String, AnswerValue>;

/// One stored answer. The wire shape is untagged JSON: a number for range
/// questions, a string for single-choice and free text, an array of strings
/// for multiple-choice, and an object for the contact step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(f64),
    Text(String),
    Selections(Vec<String>),
    Contact(ContactFormData),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_selections(&self) -> Option<&[String]> {
        match self {
            Self::Selections(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_contact(&self) -> Option<&ContactFormData> {
        match self {
            Self::Contact(data) => Some(data),
            _ => None,
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Contact details collected on the final step. Every field is optional at
/// the type level; required-ness comes from the catalog's `ContactField`
/// definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFormData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContactFormData {
    /// Look up a sub-field by its catalog id (the wire-format camelCase key).
    pub fn field(&self, id: &str) -> Option<&str> {
        let value = match id {
            "firstName" => &self.first_name,
            "lastName" => &self.last_name,
            "email" => &self.email,
            "phone" => &self.phone,
            "company" => &self.company,
            "message" => &self.message,
            _ => &None,
        };
        value.as_deref()
    }

    /// True when the field exists and is non-empty after trimming.
    pub fn field_is_filled(&self, id: &str) -> bool {
        self.field(id).is_some_and(|value| !value.trim().is_empty())
    }
}
