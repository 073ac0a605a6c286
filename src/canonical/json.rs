//! JSON Schema canonicalization
//!
//! Parses the document as JSON and re-serializes it compactly with
//! deterministic key ordering, so pure formatting differences collapse to
//! identity while semantic differences (added, removed, or changed keys)
//! do not. The document must also compile as a JSON Schema so malformed
//! schemas are rejected at parse time, before any side effect.

use serde_json::Value;

use crate::error::{RegistryError, Result};

/// Canonicalize JSON Schema text.
pub fn canonicalize(raw: &str) -> Result<String> {
    let value = parse(raw)?;
    // serde_json object maps are BTreeMaps, so serialization is already
    // key-ordered; compact form drops all incidental whitespace.
    Ok(serde_json::to_string(&value)?)
}

/// Parse JSON Schema text into a JSON value, validating that the document
/// is itself a compilable schema.
pub fn parse(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).map_err(|e| RegistryError::Parse {
        schema_type: "JSON",
        message: e.to_string(),
    })?;

    jsonschema::JSONSchema::compile(&value).map_err(|e| RegistryError::Parse {
        schema_type: "JSON",
        message: e.to_string(),
    })?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_SCHEMA: &str = r#"{
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "User",
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "name": {"type": "string"}
        },
        "required": ["id", "name"]
    }"#;

    #[test]
    fn test_formatting_collapses_to_identity() {
        let reordered = r#"{
            "type": "object",
            "title": "User",
            "required": ["id", "name"],
            "properties": {
                "name": {"type": "string"},
                "id": {"type": "integer"}
            },
            "$schema": "http://json-schema.org/draft-07/schema#"
        }"#;
        assert_eq!(
            canonicalize(USER_SCHEMA).unwrap(),
            canonicalize(reordered).unwrap()
        );
    }

    #[test]
    fn test_canonical_form_has_no_whitespace() {
        let canonical = canonicalize(USER_SCHEMA).unwrap();
        assert!(!canonical.contains('\n'));
        assert!(!canonical.contains(": "));
    }

    #[test]
    fn test_semantic_difference_is_preserved() {
        let altered = USER_SCHEMA.replace(r#""id": {"type": "integer"}"#, r#""id": {"type": "string"}"#);
        assert_ne!(
            canonicalize(USER_SCHEMA).unwrap(),
            canonicalize(&altered).unwrap()
        );
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let err = canonicalize("{not json").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Parse { schema_type: "JSON", .. }
        ));
    }

    #[test]
    fn test_invalid_schema_document_is_rejected() {
        // Parses as JSON but is not a valid schema document.
        let err = canonicalize(r#"{"type": "not-a-real-type"}"#).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Parse { schema_type: "JSON", .. }
        ));
    }
}
