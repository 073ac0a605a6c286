//! Avro canonicalization
//!
//! Delegates to `apache-avro`'s Parsing Canonical Form: fixed key order,
//! resolved named-type references, fully-qualified names, no incidental
//! whitespace.

use apache_avro::Schema as AvroSchema;

use crate::error::{RegistryError, Result};
use crate::schema::ResolvedReference;

/// Canonicalize Avro schema text.
///
/// Referenced schemas are parsed first so named types they declare are in
/// scope for the main schema.
pub fn canonicalize(raw: &str, references: &[ResolvedReference]) -> Result<String> {
    let schema = parse(raw, references)?;
    Ok(schema.canonical_form())
}

/// Parse Avro schema text, with any referenced schemas in scope.
pub fn parse(raw: &str, references: &[ResolvedReference]) -> Result<AvroSchema> {
    if references.is_empty() {
        return AvroSchema::parse_str(raw).map_err(parse_error);
    }

    // parse_list resolves named types across inputs; the main schema goes
    // last so it can see every referenced declaration.
    let mut inputs: Vec<&str> = references.iter().map(|r| r.canonical_form.as_str()).collect();
    inputs.push(raw);
    let mut parsed = AvroSchema::parse_list(&inputs).map_err(parse_error)?;
    parsed.pop().ok_or_else(|| RegistryError::Parse {
        schema_type: "AVRO",
        message: "empty schema list".to_string(),
    })
}

fn parse_error(err: apache_avro::Error) -> RegistryError {
    RegistryError::Parse {
        schema_type: "AVRO",
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_SCHEMA: &str = r#"{
        "type": "record",
        "name": "User",
        "namespace": "com.example",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "name", "type": "string"},
            {"name": "email", "type": ["null", "string"], "default": null}
        ]
    }"#;

    #[test]
    fn test_whitespace_collapses_to_identity() {
        let compact = USER_SCHEMA
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let a = canonicalize(USER_SCHEMA, &[]).unwrap();
        let b = canonicalize(&compact, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_form_is_compact() {
        let canonical = canonicalize(USER_SCHEMA, &[]).unwrap();
        assert!(!canonical.contains('\n'));
        assert!(canonical.contains(r#""name":"User""#) || canonical.contains("com.example.User"));
    }

    #[test]
    fn test_semantic_difference_changes_canonical_form() {
        let altered = USER_SCHEMA.replace(r#""name": "id""#, r#""name": "ident""#);
        let a = canonicalize(USER_SCHEMA, &[]).unwrap();
        let b = canonicalize(&altered, &[]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_schema_is_a_parse_error() {
        let err = canonicalize(r#"{"type": "recccord"}"#, &[]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::RegistryError::Parse { schema_type: "AVRO", .. }
        ));
    }

    #[test]
    fn test_reference_brings_named_type_into_scope() {
        let address = r#"{
            "type": "record",
            "name": "Address",
            "namespace": "com.example",
            "fields": [{"name": "street", "type": "string"}]
        }"#;
        let person = r#"{
            "type": "record",
            "name": "Person",
            "namespace": "com.example",
            "fields": [{"name": "home", "type": "com.example.Address"}]
        }"#;

        // Without the reference the named type is unknown.
        assert!(canonicalize(person, &[]).is_err());

        let resolved = ResolvedReference {
            name: "com.example.Address".to_string(),
            schema_id: 1,
            canonical_form: canonicalize(address, &[]).unwrap(),
        };
        assert!(canonicalize(person, &[resolved]).is_ok());
    }
}
