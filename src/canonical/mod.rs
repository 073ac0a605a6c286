//! Schema canonicalization
//!
//! Each format produces a normalized string form in which formatting
//! differences collapse to identity: two textually different but
//! structurally identical schemas canonicalize to the same string.
//! Canonicalization fails with a parse error before any store or
//! ID-allocation side effect can occur.

pub mod avro;
pub mod json;
pub mod protobuf;

use crate::error::Result;
use crate::schema::{ResolvedReference, SchemaType};

/// Canonicalize raw schema text for the declared type.
///
/// `references` carries the canonical forms of any referenced schemas,
/// already resolved against the registry; formats that need them (Avro
/// named types) place them in scope during parsing.
pub fn canonicalize(
    schema_type: SchemaType,
    raw: &str,
    references: &[ResolvedReference],
) -> Result<String> {
    match schema_type {
        SchemaType::Avro => avro::canonicalize(raw, references),
        SchemaType::Json => json::canonicalize(raw),
        SchemaType::Protobuf => protobuf::canonicalize(raw),
    }
}
