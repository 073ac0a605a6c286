//! Schema types and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique schema identifier.
///
/// The wire prefix encodes the ID as an unsigned 32-bit big-endian integer,
/// and that byte layout is the compatibility contract with existing
/// serializers, so IDs are 32-bit throughout.
pub type SchemaId = u32;

/// Per-subject version number, 1-based and gapless.
pub type VersionNumber = u32;

/// Type of schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    /// Apache Avro schemas
    Avro,
    /// JSON Schema definitions
    Json,
    /// Protocol Buffers definitions
    Protobuf,
}

impl SchemaType {
    /// Stable tag mixed into fingerprints so that identical text under
    /// different formats never collides.
    pub fn tag(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Json => "JSON",
            SchemaType::Protobuf => "PROTOBUF",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for SchemaType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVRO" => Ok(SchemaType::Avro),
            "JSON" => Ok(SchemaType::Json),
            "PROTOBUF" => Ok(SchemaType::Protobuf),
            other => Err(format!("unknown schema type: {}", other)),
        }
    }
}

/// A reference from one schema to another registered schema, addressed by
/// subject and version. References participate in schema identity: two
/// schemas with equal text but different references are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaReference {
    /// Name the schema text uses for the reference (import path for
    /// Protobuf, full type name for Avro, `$ref` URI for JSON Schema)
    pub name: String,
    /// Subject the referenced schema is registered under
    pub subject: String,
    /// Version of the referenced schema within that subject
    pub version: VersionNumber,
}

impl SchemaReference {
    pub fn new(
        name: impl Into<String>,
        subject: impl Into<String>,
        version: VersionNumber,
    ) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            version,
        }
    }
}

/// An immutable schema record.
///
/// Identity is `(schema_type, canonical_form, references)`; the ID is
/// assigned once at creation and never reused. Records are never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Globally unique identifier
    pub id: SchemaId,
    /// Type of schema
    pub schema_type: SchemaType,
    /// Canonicalized schema text
    pub canonical_form: String,
    /// References to other registered schemas, in declaration order
    pub references: Vec<SchemaReference>,
    /// When this record was created
    pub created_at: DateTime<Utc>,
}

/// Result of a successful registration: the global ID of the schema content
/// and the version it occupies under the registering subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredSchema {
    pub id: SchemaId,
    pub version: VersionNumber,
}

/// A reference resolved against the registry: the referenced schema's
/// canonical form, ready to be placed in scope during canonicalization.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub name: String,
    pub schema_id: SchemaId,
    pub canonical_form: String,
}
