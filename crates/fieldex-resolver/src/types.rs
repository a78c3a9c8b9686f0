//! Request and response types for field resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A field the heuristic layer could not settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncertainField {
    /// Field name from the schema.
    pub name: String,
    /// Free-text description from the schema.
    pub description: String,
    /// Best heuristic candidate, passed to the model as a hint.
    pub hint: Option<String>,
}

impl UncertainField {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// One batched resolution request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// Full document text; truncated when the prompt is built.
    pub doc_text: String,
    /// Fields to resolve, in prompt order.
    pub fields: Vec<UncertainField>,
}

impl ResolveRequest {
    pub fn new(doc_text: impl Into<String>, fields: Vec<UncertainField>) -> Self {
        Self {
            doc_text: doc_text.into(),
            fields,
        }
    }

    /// Names of the requested fields.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Layout hints the model reported for a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverMetadata {
    /// Label phrases that precede the value in the document.
    pub anchors: Vec<String>,
    /// Enumerated values the field can take.
    pub enums: Vec<String>,
    /// Page region tag where the value was found.
    pub region: Option<String>,
}

impl ResolverMetadata {
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty() && self.enums.is_empty() && self.region.is_none()
    }
}

/// Resolution for a single field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResolution {
    /// Resolved value, `None` when the model found nothing.
    pub value: Option<String>,
    /// Optional layout metadata.
    pub metadata: Option<ResolverMetadata>,
}

impl FieldResolution {
    /// A resolution carrying neither value nor metadata.
    pub fn unresolved() -> Self {
        Self::default()
    }
}

/// Resolutions keyed by field name.
pub type Resolutions = BTreeMap<String, FieldResolution>;
