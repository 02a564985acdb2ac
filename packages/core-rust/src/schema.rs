use serde::{Deserialize, Serialize};

use crate::types::Document;

/// Declared shape of a persisted entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity type name (e.g. `"Invoice"`), used as the collection name.
    pub name: String,
    /// Field definitions that comprise this entity's schema.
    pub fields: Vec<FieldDef>,
}

/// Single field definition within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Name of the field.
    pub name: String,
    /// Whether the field must be present in every record.
    #[serde(default)]
    pub required: bool,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            required: false,
        });
        self
    }

    #[must_use]
    pub fn required_field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            required: true,
        });
        self
    }

    #[must_use]
    pub fn declares(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.name == field)
    }

    /// Checks that every required field is present in `doc`.
    #[must_use]
    pub fn validate(&self, doc: &Document) -> ValidationResult {
        let errors: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.required && !doc.contains_key(&f.name))
            .map(|f| format!("{}: missing required field `{}`", self.name, f.name))
            .collect();
        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }
}

/// Result of validating a document against a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The document conforms to the schema.
    Valid,
    /// The document violates one or more schema constraints.
    Invalid {
        /// Human-readable descriptions of each validation failure.
        errors: Vec<String>,
    },
}
