//! JSON Schema compatibility rules
//!
//! Directed check over object schemas: a reader schema can consume writer
//! data unless a required property was removed, a property became newly
//! required, or a shared property's declared type or enum narrowed. The
//! `type` keyword is normalized to a set so union types like
//! `["string", "null"]` participate; losing a member the writer had is a
//! narrowing. Adding optional properties is always acceptable. Nested
//! object schemas are checked recursively through `properties`.

use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use crate::compat::{Violation, ViolationKind};
use crate::error::Result;

/// Collect violations preventing a reader on `reader` from consuming data
/// written under `writer`. Both inputs are canonical JSON Schema forms.
pub fn collect(writer: &str, reader: &str, violations: &mut Vec<Violation>) -> Result<()> {
    let writer: Value = serde_json::from_str(writer)?;
    let reader: Value = serde_json::from_str(reader)?;
    let path = reader
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("schema")
        .to_string();
    check_object(&writer, &reader, &path, violations);
    Ok(())
}

fn required_set(schema: &Value) -> HashSet<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn properties(schema: &Value) -> Option<&serde_json::Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

/// The `type` keyword normalized to a set: a bare string is a singleton,
/// an array is a union.
fn type_set(schema: &Value) -> Option<BTreeSet<&str>> {
    match schema.get("type")? {
        Value::String(s) => Some(std::iter::once(s.as_str()).collect()),
        Value::Array(entries) => Some(entries.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Whether data written as `written` is acceptable to a reader declaring
/// `reader_types`. Integer values are valid numbers.
fn covers(reader_types: &BTreeSet<&str>, written: &str) -> bool {
    reader_types.contains(written) || (written == "integer" && reader_types.contains("number"))
}

fn check_object(writer: &Value, reader: &Value, path: &str, violations: &mut Vec<Violation>) {
    let writer_required = required_set(writer);
    let reader_required = required_set(reader);
    let writer_props = properties(writer);
    let reader_props = properties(reader);

    // A property the reader requires must have been guaranteed present in
    // writer data.
    for property in &reader_required {
        if !writer_required.contains(property) {
            violations.push(Violation::new(
                format!("{}.{}", path, property),
                ViolationKind::AddedRequiredProperty,
                "property is required but earlier data may omit it",
            ));
        }
    }

    // A property the writer required must still be understood.
    for property in &writer_required {
        let still_declared = reader_props.is_some_and(|props| props.contains_key(*property));
        if !still_declared {
            violations.push(Violation::new(
                format!("{}.{}", path, property),
                ViolationKind::RemovedRequiredProperty,
                "required property was removed from the schema",
            ));
        }
    }

    // Shared properties must not narrow their declared type or enum.
    if let (Some(writer_props), Some(reader_props)) = (writer_props, reader_props) {
        for (name, reader_prop) in reader_props {
            let Some(writer_prop) = writer_props.get(name) else {
                continue;
            };
            let prop_path = format!("{}.{}", path, name);
            check_property_types(writer_prop, reader_prop, &prop_path, violations);
            check_enum(writer_prop, reader_prop, &prop_path, violations);
        }
    }
}

fn check_property_types(
    writer_prop: &Value,
    reader_prop: &Value,
    prop_path: &str,
    violations: &mut Vec<Violation>,
) {
    let (Some(writer_types), Some(reader_types)) = (type_set(writer_prop), type_set(reader_prop))
    else {
        return;
    };

    let missing: Vec<&str> = writer_types
        .iter()
        .filter(|written| !covers(&reader_types, written))
        .copied()
        .collect();
    if missing.is_empty() {
        if writer_types.contains("object") && reader_types.contains("object") {
            check_object(writer_prop, reader_prop, prop_path, violations);
        }
        return;
    }

    // Some overlap remains (or only the integer subset of number does):
    // the type was narrowed. No overlap at all is an outright change.
    let narrowed = writer_types.iter().any(|written| covers(&reader_types, written))
        || (writer_types.contains("number") && reader_types.contains("integer"));
    if narrowed {
        violations.push(Violation::new(
            prop_path,
            ViolationKind::NarrowedType,
            format!("type no longer accepts {}", missing.join(", ")),
        ));
    } else {
        violations.push(Violation::new(
            prop_path,
            ViolationKind::TypeMismatch,
            format!(
                "type changed from {} to {}",
                writer_types.iter().copied().collect::<Vec<_>>().join("|"),
                reader_types.iter().copied().collect::<Vec<_>>().join("|")
            ),
        ));
    }
}

/// An enum the writer could emit must still be accepted by the reader.
fn check_enum(
    writer_prop: &Value,
    reader_prop: &Value,
    prop_path: &str,
    violations: &mut Vec<Violation>,
) {
    let (Some(writer_enum), Some(reader_enum)) = (
        writer_prop.get("enum").and_then(Value::as_array),
        reader_prop.get("enum").and_then(Value::as_array),
    ) else {
        return;
    };

    let missing: Vec<String> = writer_enum
        .iter()
        .filter(|value| !reader_enum.contains(value))
        .map(|value| value.to_string())
        .collect();
    if !missing.is_empty() {
        violations.push(Violation::new(
            prop_path,
            ViolationKind::NarrowedType,
            format!("enum no longer accepts {}", missing.join(", ")),
        ));
    }
}
