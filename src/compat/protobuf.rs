//! Protobuf compatibility rules
//!
//! Directed check over descriptor models. A field number is a contract:
//! reusing one with a different wire type, or dropping a field without
//! reserving its number, breaks decoding for one side. Messages are
//! matched by name, including nested messages; fields inside oneof groups
//! participate like ordinary fields.

use std::collections::HashSet;

use crate::canonical::protobuf::{FieldDescriptor, FieldType, MessageDescriptor};
use crate::compat::{Violation, ViolationKind};
use crate::error::Result;

/// Collect violations preventing a reader on `reader` from consuming data
/// written under `writer`. Both inputs are canonical Protobuf forms.
pub fn collect(writer: &str, reader: &str, violations: &mut Vec<Violation>) -> Result<()> {
    let writer = crate::canonical::protobuf::parse(writer)?;
    let reader = crate::canonical::protobuf::parse(reader)?;

    let enums = Enums {
        writer: writer.enum_names(),
        reader: reader.enum_names(),
    };

    for writer_message in &writer.messages {
        match reader.messages.iter().find(|m| m.name == writer_message.name) {
            Some(reader_message) => check_message(
                writer_message,
                reader_message,
                &writer_message.name.clone(),
                &enums,
                violations,
            ),
            None => violations.push(Violation::new(
                writer_message.name.clone(),
                ViolationKind::MessageRemoved,
                "message is no longer declared",
            )),
        }
    }
    Ok(())
}

struct Enums {
    writer: HashSet<String>,
    reader: HashSet<String>,
}

fn check_message(
    writer: &MessageDescriptor,
    reader: &MessageDescriptor,
    path: &str,
    enums: &Enums,
    violations: &mut Vec<Violation>,
) {
    for writer_field in writer.all_fields() {
        let field_path = format!("{}.{}", path, writer_field.name);
        match reader.all_fields().find(|f| f.number == writer_field.number) {
            Some(reader_field) => {
                check_field(writer_field, reader_field, &field_path, enums, violations);
            }
            None => {
                // Same name under a different number is a renumbering, which
                // silently corrupts decoding; otherwise the number must be
                // reserved so it can never be recycled.
                if let Some(moved) = reader.all_fields().find(|f| f.name == writer_field.name) {
                    violations.push(Violation::new(
                        field_path,
                        ViolationKind::FieldNumberChanged,
                        format!(
                            "field number changed from {} to {}",
                            writer_field.number, moved.number
                        ),
                    ));
                } else if !reader.is_number_reserved(writer_field.number) {
                    violations.push(Violation::new(
                        field_path,
                        ViolationKind::RemovedFieldNotReserved,
                        format!(
                            "field removed without reserving number {}",
                            writer_field.number
                        ),
                    ));
                }
            }
        }
    }

    // Recurse into nested messages present on both sides.
    for writer_nested in &writer.nested {
        if let Some(reader_nested) = reader.nested.iter().find(|m| m.name == writer_nested.name) {
            let nested_path = format!("{}.{}", path, writer_nested.name);
            check_message(writer_nested, reader_nested, &nested_path, enums, violations);
        }
    }
}

fn check_field(
    writer: &FieldDescriptor,
    reader: &FieldDescriptor,
    path: &str,
    enums: &Enums,
    violations: &mut Vec<Violation>,
) {
    let writer_wire = wire_category(&writer.field_type, &enums.writer);
    let reader_wire = wire_category(&reader.field_type, &enums.reader);
    if writer_wire != reader_wire {
        violations.push(Violation::new(
            path,
            ViolationKind::WireTypeChanged,
            format!(
                "wire type changed from {:?} to {:?}",
                writer_wire, reader_wire
            ),
        ));
        return;
    }

    // Two named types with the same wire category still clash if they
    // name different messages or enums.
    if let (FieldType::Named(writer_name), FieldType::Named(reader_name)) =
        (&writer.field_type, &reader.field_type)
    {
        if simple_name(writer_name) != simple_name(reader_name) {
            violations.push(Violation::new(
                path,
                ViolationKind::TypeMismatch,
                format!(
                    "field type changed from {} to {}",
                    writer_name, reader_name
                ),
            ));
        }
    }

    // Maps share the length-delimited wire category regardless of what
    // they hold, so key and value types are compared separately.
    if let (FieldType::Map(writer_key, writer_value), FieldType::Map(reader_key, reader_value)) =
        (&writer.field_type, &reader.field_type)
    {
        if writer_key != reader_key {
            violations.push(Violation::new(
                path,
                ViolationKind::TypeMismatch,
                format!(
                    "map key type changed from {} to {}",
                    writer_key.render(),
                    reader_key.render()
                ),
            ));
        }
        let value_changed = match (writer_value.as_ref(), reader_value.as_ref()) {
            (FieldType::Named(w), FieldType::Named(r)) => simple_name(w) != simple_name(r),
            (FieldType::Named(_), _) | (_, FieldType::Named(_)) => true,
            (w, r) => wire_category(w, &enums.writer) != wire_category(r, &enums.reader),
        };
        if value_changed {
            violations.push(Violation::new(
                path,
                ViolationKind::TypeMismatch,
                format!(
                    "map value type changed from {} to {}",
                    writer_value.render(),
                    reader_value.render()
                ),
            ));
        }
    }
}

/// Protobuf wire categories; changing between them on one field number is
/// undecodable on one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireCategory {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

fn wire_category(field_type: &FieldType, local_enums: &HashSet<String>) -> WireCategory {
    match field_type {
        FieldType::Int32
        | FieldType::Int64
        | FieldType::Uint32
        | FieldType::Uint64
        | FieldType::Sint32
        | FieldType::Sint64
        | FieldType::Bool => WireCategory::Varint,
        FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireCategory::Fixed64,
        FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireCategory::Fixed32,
        FieldType::String | FieldType::Bytes | FieldType::Map(_, _) => {
            WireCategory::LengthDelimited
        }
        FieldType::Named(name) => {
            // Enums ride the varint wire type; messages are
            // length-delimited. Imported names we cannot see are messages
            // in practice.
            if local_enums.contains(name) || local_enums.contains(simple_name(name)) {
                WireCategory::Varint
            } else {
                WireCategory::LengthDelimited
            }
        }
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
