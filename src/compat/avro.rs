//! Avro compatibility rules
//!
//! Implements Avro schema resolution for the directed question "can a
//! reader using the new schema consume data written with the old one":
//! reader fields absent from the writer need a default, writer fields
//! absent from the reader are skipped, and type changes must follow Avro's
//! promotion rules (int to long, float to double, string to bytes and
//! back). Named types are matched by name; enums require the reader to
//! know every writer symbol.

use apache_avro::schema::Schema as AvroSchema;
use std::collections::HashMap;

use crate::compat::{CanonicalSchema, Violation, ViolationKind};
use crate::error::Result;

/// Collect violations preventing `reader` from reading data written with
/// `writer`. Each side's resolved references are put back in scope so
/// canonical forms naming externally-defined types parse.
pub fn collect(
    writer: &CanonicalSchema,
    reader: &CanonicalSchema,
    violations: &mut Vec<Violation>,
) -> Result<()> {
    let writer = crate::canonical::avro::parse(&writer.form, &writer.references)?;
    let reader = crate::canonical::avro::parse(&reader.form, &reader.references)?;

    let ctx = Context {
        writer_names: collect_named(&writer),
        reader_names: collect_named(&reader),
    };
    let path = schema_name(&reader).unwrap_or_else(|| "schema".to_string());
    readable(&writer, &reader, &path, &ctx, violations);
    Ok(())
}

struct Context<'a> {
    writer_names: HashMap<String, &'a AvroSchema>,
    reader_names: HashMap<String, &'a AvroSchema>,
}

/// Index named types (records, enums, fixeds) so `Schema::Ref` nodes can
/// be chased during resolution.
fn collect_named(schema: &AvroSchema) -> HashMap<String, &AvroSchema> {
    let mut names = HashMap::new();
    walk(schema, &mut names);
    names
}

fn walk<'a>(schema: &'a AvroSchema, names: &mut HashMap<String, &'a AvroSchema>) {
    match schema {
        AvroSchema::Record(record) => {
            names.insert(record.name.name.clone(), schema);
            for field in &record.fields {
                walk(&field.schema, names);
            }
        }
        AvroSchema::Enum(e) => {
            names.insert(e.name.name.clone(), schema);
        }
        AvroSchema::Fixed(fixed) => {
            names.insert(fixed.name.name.clone(), schema);
        }
        AvroSchema::Array(items) => walk(items, names),
        AvroSchema::Map(values) => walk(values, names),
        AvroSchema::Union(union) => {
            for variant in union.variants() {
                walk(variant, names);
            }
        }
        _ => {}
    }
}

fn deref<'a>(
    schema: &'a AvroSchema,
    names: &HashMap<String, &'a AvroSchema>,
) -> &'a AvroSchema {
    if let AvroSchema::Ref { name } = schema {
        if let Some(resolved) = names.get(&name.name) {
            return resolved;
        }
    }
    schema
}

fn schema_name(schema: &AvroSchema) -> Option<String> {
    match schema {
        AvroSchema::Record(record) => Some(record.name.name.clone()),
        AvroSchema::Enum(e) => Some(e.name.name.clone()),
        AvroSchema::Fixed(fixed) => Some(fixed.name.name.clone()),
        _ => None,
    }
}

fn readable(
    writer: &AvroSchema,
    reader: &AvroSchema,
    path: &str,
    ctx: &Context<'_>,
    violations: &mut Vec<Violation>,
) {
    let writer = deref(writer, &ctx.writer_names);
    let reader = deref(reader, &ctx.reader_names);

    match (writer, reader) {
        // Every writer branch must be readable, otherwise some written
        // values have no decoding under the reader.
        (AvroSchema::Union(writer_union), _) => {
            for branch in writer_union.variants() {
                readable(branch, reader, path, ctx, violations);
            }
        }
        // A reader union accepts the writer if any branch resolves.
        (_, AvroSchema::Union(reader_union)) => {
            let matches_any = reader_union
                .variants()
                .iter()
                .any(|branch| reads_quietly(writer, branch, ctx));
            if !matches_any {
                violations.push(Violation::new(
                    path,
                    ViolationKind::TypeMismatch,
                    format!(
                        "writer type {} matches no branch of the reader union",
                        describe(writer)
                    ),
                ));
            }
        }
        (AvroSchema::Record(writer_record), AvroSchema::Record(reader_record)) => {
            if writer_record.name.name != reader_record.name.name {
                violations.push(Violation::new(
                    path,
                    ViolationKind::NameMismatch,
                    format!(
                        "record name changed from '{}' to '{}'",
                        writer_record.name.name, reader_record.name.name
                    ),
                ));
                return;
            }
            for reader_field in &reader_record.fields {
                let field_path = format!("{}.{}", path, reader_field.name);
                let writer_field = writer_record.fields.iter().find(|wf| {
                    wf.name == reader_field.name
                        || reader_field
                            .aliases
                            .as_ref()
                            .is_some_and(|aliases| aliases.contains(&wf.name))
                });
                match writer_field {
                    Some(writer_field) => {
                        readable(
                            &writer_field.schema,
                            &reader_field.schema,
                            &field_path,
                            ctx,
                            violations,
                        );
                    }
                    None if reader_field.default.is_none() => {
                        violations.push(Violation::new(
                            field_path,
                            ViolationKind::MissingDefault,
                            "field is absent from the earlier schema and has no default",
                        ));
                    }
                    // Field filled from its default; writer fields the
                    // reader does not know are skipped during decoding.
                    None => {}
                }
            }
        }
        (AvroSchema::Enum(writer_enum), AvroSchema::Enum(reader_enum)) => {
            if writer_enum.name.name != reader_enum.name.name {
                violations.push(Violation::new(
                    path,
                    ViolationKind::NameMismatch,
                    format!(
                        "enum name changed from '{}' to '{}'",
                        writer_enum.name.name, reader_enum.name.name
                    ),
                ));
                return;
            }
            let missing: Vec<&String> = writer_enum
                .symbols
                .iter()
                .filter(|symbol| !reader_enum.symbols.contains(symbol))
                .collect();
            if !missing.is_empty() {
                violations.push(Violation::new(
                    path,
                    ViolationKind::MissingEnumSymbols,
                    format!(
                        "symbols {:?} can be written but not read",
                        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>()
                    ),
                ));
            }
        }
        (AvroSchema::Fixed(writer_fixed), AvroSchema::Fixed(reader_fixed)) => {
            if writer_fixed.name.name != reader_fixed.name.name
                || writer_fixed.size != reader_fixed.size
            {
                violations.push(Violation::new(
                    path,
                    ViolationKind::TypeMismatch,
                    "fixed name or size changed",
                ));
            }
        }
        (AvroSchema::Array(writer_items), AvroSchema::Array(reader_items)) => {
            readable(
                writer_items,
                reader_items,
                &format!("{}[]", path),
                ctx,
                violations,
            );
        }
        (AvroSchema::Map(writer_values), AvroSchema::Map(reader_values)) => {
            readable(
                writer_values,
                reader_values,
                &format!("{}{{}}", path),
                ctx,
                violations,
            );
        }
        (writer, reader) => {
            if !promotable(writer, reader) {
                violations.push(Violation::new(
                    path,
                    ViolationKind::TypeMismatch,
                    format!(
                        "type changed from {} to {} without a valid promotion",
                        describe(writer),
                        describe(reader)
                    ),
                ));
            }
        }
    }
}

/// Try a (writer, reader) pair without recording violations; used for
/// union branch matching.
fn reads_quietly(writer: &AvroSchema, reader: &AvroSchema, ctx: &Context<'_>) -> bool {
    let mut scratch = Vec::new();
    readable(writer, reader, "", ctx, &mut scratch);
    scratch.is_empty()
}

/// Base primitive kind, with logical types mapped to their underlying
/// primitive for promotion purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    Str,
}

fn primitive(schema: &AvroSchema) -> Option<Primitive> {
    match schema {
        AvroSchema::Null => Some(Primitive::Null),
        AvroSchema::Boolean => Some(Primitive::Boolean),
        AvroSchema::Int | AvroSchema::Date | AvroSchema::TimeMillis => Some(Primitive::Int),
        AvroSchema::Long
        | AvroSchema::TimeMicros
        | AvroSchema::TimestampMillis
        | AvroSchema::TimestampMicros
        | AvroSchema::LocalTimestampMillis
        | AvroSchema::LocalTimestampMicros => Some(Primitive::Long),
        AvroSchema::Float => Some(Primitive::Float),
        AvroSchema::Double => Some(Primitive::Double),
        AvroSchema::Bytes => Some(Primitive::Bytes),
        AvroSchema::String | AvroSchema::Uuid => Some(Primitive::Str),
        _ => None,
    }
}

/// Avro's documented promotion rules, writer to reader.
fn promotable(writer: &AvroSchema, reader: &AvroSchema) -> bool {
    match (primitive(writer), primitive(reader)) {
        (Some(w), Some(r)) => {
            w == r
                || matches!(
                    (w, r),
                    (Primitive::Int, Primitive::Long)
                        | (Primitive::Int, Primitive::Float)
                        | (Primitive::Int, Primitive::Double)
                        | (Primitive::Long, Primitive::Float)
                        | (Primitive::Long, Primitive::Double)
                        | (Primitive::Float, Primitive::Double)
                        | (Primitive::Str, Primitive::Bytes)
                        | (Primitive::Bytes, Primitive::Str)
                )
        }
        // Anything structural that fell through the specific arms (decimal,
        // duration) is compatible only when literally identical.
        _ => writer.canonical_form() == reader.canonical_form(),
    }
}

fn describe(schema: &AvroSchema) -> String {
    match schema_name(schema) {
        Some(name) => name,
        None => format!("{:?}", apache_avro::schema::SchemaKind::from(schema)),
    }
}
