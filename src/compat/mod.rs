//! Schema compatibility checking
//!
//! Given a candidate schema and the prior schemas of a subject, decides
//! whether the candidate is an acceptable evolution under the subject's
//! configured compatibility level. Checks are pure: they never touch the
//! schema store or the subject registry, and on rejection they carry
//! structured per-field violations so the transport layer can build a
//! 409/422-class response.

pub mod avro;
pub mod json;
pub mod protobuf;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RegistryError, Result};
use crate::schema::{ResolvedReference, SchemaType};

/// A canonical schema together with the resolved references its text may
/// name. Formats whose canonical form can mention externally-defined
/// types (Avro named types) need the references back in scope to parse.
#[derive(Debug, Clone)]
pub struct CanonicalSchema {
    pub form: String,
    pub references: Vec<ResolvedReference>,
}

impl CanonicalSchema {
    /// A self-contained canonical schema with no references.
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            references: Vec::new(),
        }
    }

    pub fn with_references(form: impl Into<String>, references: Vec<ResolvedReference>) -> Self {
        Self {
            form: form.into(),
            references,
        }
    }
}

/// Compatibility policy for a subject (or the global default)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityLevel {
    None,
    #[default]
    Backward,
    Forward,
    Full,
    BackwardTransitive,
    ForwardTransitive,
    FullTransitive,
}

impl CompatibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::None => "NONE",
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
        }
    }

    /// Whether the level is checked against every prior version rather
    /// than only the immediately preceding one.
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }

    fn checks_backward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Backward
                | CompatibilityLevel::Full
                | CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }

    fn checks_forward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Forward
                | CompatibilityLevel::Full
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityLevel {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(CompatibilityLevel::None),
            "BACKWARD" => Ok(CompatibilityLevel::Backward),
            "FORWARD" => Ok(CompatibilityLevel::Forward),
            "FULL" => Ok(CompatibilityLevel::Full),
            "BACKWARD_TRANSITIVE" => Ok(CompatibilityLevel::BackwardTransitive),
            "FORWARD_TRANSITIVE" => Ok(CompatibilityLevel::ForwardTransitive),
            "FULL_TRANSITIVE" => Ok(CompatibilityLevel::FullTransitive),
            other => Err(RegistryError::InvalidCompatibilityLevel(other.to_string())),
        }
    }
}

/// Kind of compatibility violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    /// Reader field absent from writer data with no default to fall back on
    MissingDefault,
    /// Field or property type changed in a non-promotable way
    TypeMismatch,
    /// Declared type narrowed (e.g. number to integer)
    NarrowedType,
    /// Required property removed from the schema
    RemovedRequiredProperty,
    /// Property newly marked required
    AddedRequiredProperty,
    /// Protobuf field removed without reserving its number
    RemovedFieldNotReserved,
    /// Same field name now carries a different number
    FieldNumberChanged,
    /// Field number reuses a different wire type
    WireTypeChanged,
    /// Message present before is gone from the candidate
    MessageRemoved,
    /// Named type (record, enum, fixed) changed identity
    NameMismatch,
    /// Writer enum symbols missing from the reader enum
    MissingEnumSymbols,
    /// Candidate declares a different schema format than the prior version
    FormatChanged,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::MissingDefault => "MISSING_DEFAULT",
            ViolationKind::TypeMismatch => "TYPE_MISMATCH",
            ViolationKind::NarrowedType => "NARROWED_TYPE",
            ViolationKind::RemovedRequiredProperty => "REMOVED_REQUIRED_PROPERTY",
            ViolationKind::AddedRequiredProperty => "ADDED_REQUIRED_PROPERTY",
            ViolationKind::RemovedFieldNotReserved => "REMOVED_FIELD_NOT_RESERVED",
            ViolationKind::FieldNumberChanged => "FIELD_NUMBER_CHANGED",
            ViolationKind::WireTypeChanged => "WIRE_TYPE_CHANGED",
            ViolationKind::MessageRemoved => "MESSAGE_REMOVED",
            ViolationKind::NameMismatch => "NAME_MISMATCH",
            ViolationKind::MissingEnumSymbols => "MISSING_ENUM_SYMBOLS",
            ViolationKind::FormatChanged => "FORMAT_CHANGED",
        };
        f.write_str(s)
    }
}

/// A single structured compatibility violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Path to the offending field or property, e.g. `User.email`
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at '{}': {}", self.kind, self.path, self.message)
    }
}

/// Check a candidate canonical schema against prior canonical schemas.
///
/// `priors` is ordered oldest first. Non-transitive levels consult only the
/// last (latest) entry; transitive levels consult every entry. Errors with
/// `RegistryError::Incompatible` carrying all collected violations.
pub fn check(
    schema_type: SchemaType,
    candidate: &CanonicalSchema,
    priors: &[CanonicalSchema],
    level: CompatibilityLevel,
) -> Result<()> {
    let violations = collect_violations(schema_type, candidate, priors, level)?;
    if violations.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::Incompatible { violations })
    }
}

/// Like [`check`], but returns the violations instead of an error, for
/// callers that report rather than reject (`test_compatibility` and the
/// CLI).
pub fn collect_violations(
    schema_type: SchemaType,
    candidate: &CanonicalSchema,
    priors: &[CanonicalSchema],
    level: CompatibilityLevel,
) -> Result<Vec<Violation>> {
    if level == CompatibilityLevel::None || priors.is_empty() {
        return Ok(Vec::new());
    }

    let applicable: &[CanonicalSchema] = if level.is_transitive() {
        priors
    } else {
        &priors[priors.len() - 1..]
    };

    let mut violations = Vec::new();
    for prior in applicable {
        if level.checks_backward() {
            // Readers on the candidate, writers on the prior version.
            collect_directed(schema_type, prior, candidate, &mut violations)?;
        }
        if level.checks_forward() {
            // Roles swapped: readers stay on the prior version.
            collect_directed(schema_type, candidate, prior, &mut violations)?;
        }
    }
    violations.dedup();
    Ok(violations)
}

/// One directed check: can a reader using `reader` consume data written
/// with `writer`? Both inputs are canonical forms of the same type.
fn collect_directed(
    schema_type: SchemaType,
    writer: &CanonicalSchema,
    reader: &CanonicalSchema,
    violations: &mut Vec<Violation>,
) -> Result<()> {
    match schema_type {
        SchemaType::Avro => avro::collect(writer, reader, violations),
        SchemaType::Json => json::collect(&writer.form, &reader.form, violations),
        SchemaType::Protobuf => protobuf::collect(&writer.form, &reader.form, violations),
    }
}
