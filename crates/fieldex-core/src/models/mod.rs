//! Data models: configuration and extraction output.

pub mod config;
pub mod output;

use std::collections::BTreeMap;

use crate::error::{FieldexError, Result};

/// Field name to free-text description, iterated in name order.
pub type Schema = BTreeMap<String, String>;

/// Check that a schema names at least one field and no blank ones.
pub fn validate_schema(schema: &Schema) -> Result<()> {
    if schema.is_empty() {
        return Err(FieldexError::Config("schema must contain at least one field".to_string()));
    }
    if schema.keys().any(|name| name.trim().is_empty()) {
        return Err(FieldexError::Config("schema field names must not be empty".to_string()));
    }
    Ok(())
}
