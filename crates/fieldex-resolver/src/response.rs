//! Decoding of model replies into per-field resolutions.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ResolverError;
use crate::types::{FieldResolution, Resolutions, ResolverMetadata};
use crate::Result;

/// Decode a raw model reply into resolutions for the `requested` fields.
///
/// The reply is expected to look like
/// `{"fields": {name: value}, "metadata": {name: {"anchors": [..], "enums": [..], "region": ..}}}`.
/// Only requested fields appear in the output; fields the model omitted
/// resolve to no value.
pub fn parse_resolutions<'a>(
    raw: &str,
    requested: impl IntoIterator<Item = &'a str>,
) -> Result<Resolutions> {
    let json: Value = serde_json::from_str(strip_code_fence(raw))?;

    let root = json
        .as_object()
        .ok_or_else(|| ResolverError::InvalidResponse("expected a JSON object".to_string()))?;

    let empty = Map::new();
    let fields = root.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    let metadata = root.get("metadata").and_then(Value::as_object).unwrap_or(&empty);

    if fields.is_empty() {
        debug!("Model reply has no \"fields\" object");
    }

    let resolutions = requested
        .into_iter()
        .map(|name| {
            let resolution = FieldResolution {
                value: fields.get(name).and_then(value_to_string),
                metadata: metadata.get(name).and_then(parse_metadata),
            };
            (name.to_string(), resolution)
        })
        .collect();

    Ok(resolutions)
}

/// Remove a surrounding markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().eq_ignore_ascii_case("null") => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring non-list metadata entry: {}", other);
            Vec::new()
        }
    }
}

fn parse_metadata(value: &Value) -> Option<ResolverMetadata> {
    let obj = value.as_object()?;

    let metadata = ResolverMetadata {
        anchors: string_list(obj.get("anchors")),
        enums: string_list(obj.get("enums")),
        region: obj.get("region").and_then(value_to_string),
    };

    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_values_and_metadata() {
        let raw = r#"{
            "fields": {"nome": "Maria Silva", "telefone": null},
            "metadata": {"nome": {"anchors": ["Nome"], "enums": [], "region": "top_left"}}
        }"#;

        let resolutions = parse_resolutions(raw, ["nome", "telefone"]).unwrap();

        assert_eq!(resolutions["nome"].value.as_deref(), Some("Maria Silva"));
        assert_eq!(
            resolutions["nome"].metadata,
            Some(ResolverMetadata {
                anchors: vec!["Nome".to_string()],
                enums: vec![],
                region: Some("top_left".to_string()),
            })
        );
        assert_eq!(resolutions["telefone"], FieldResolution::unresolved());
    }

    #[test]
    fn test_parse_only_requested_fields() {
        let raw = r#"{"fields": {"nome": "Maria", "extra": "ignored"}}"#;
        let resolutions = parse_resolutions(raw, ["nome", "missing"]).unwrap();

        assert_eq!(resolutions.len(), 2);
        assert!(resolutions.contains_key("missing"));
        assert!(!resolutions.contains_key("extra"));
        assert_eq!(resolutions["missing"].value, None);
    }

    #[test]
    fn test_parse_coerces_scalars_and_null_strings() {
        let raw = r#"{"fields": {"inscricao": 123456, "ativo": true, "nada": "null"}}"#;
        let resolutions = parse_resolutions(raw, ["inscricao", "ativo", "nada"]).unwrap();

        assert_eq!(resolutions["inscricao"].value.as_deref(), Some("123456"));
        assert_eq!(resolutions["ativo"].value.as_deref(), Some("true"));
        assert_eq!(resolutions["nada"].value, None);
    }

    #[test]
    fn test_parse_code_fenced_reply() {
        let raw = "```json\n{\"fields\": {\"uf\": \"SP\"}}\n```";
        let resolutions = parse_resolutions(raw, ["uf"]).unwrap();
        assert_eq!(resolutions["uf"].value.as_deref(), Some("SP"));
    }

    #[test]
    fn test_parse_ignores_malformed_metadata() {
        let raw = r#"{"fields": {"uf": "SP"}, "metadata": {"uf": {"anchors": "UF", "region": null}}}"#;
        let resolutions = parse_resolutions(raw, ["uf"]).unwrap();
        assert_eq!(resolutions["uf"].metadata, None);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_resolutions("not json at all", ["uf"]).unwrap_err();
        assert!(matches!(err, ResolverError::Decode(_)));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = parse_resolutions("[1, 2]", ["uf"]).unwrap_err();
        assert!(matches!(err, ResolverError::InvalidResponse(_)));
    }
}
