//! Error types for the schema registry core

use thiserror::Error;

use crate::compat::Violation;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Schema registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Raw schema text does not parse as the declared type.
    /// Always raised before any store or subject mutation.
    #[error("invalid {schema_type} schema: {message}")]
    Parse {
        schema_type: &'static str,
        message: String,
    },

    /// Candidate schema fails the configured compatibility level.
    /// Maps to a 409/422-class response at the transport layer.
    #[error("schema is incompatible with an earlier schema: {}", format_violations(.violations))]
    Incompatible { violations: Vec<Violation> },

    #[error("schema not found: id {0}")]
    SchemaNotFound(u32),

    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    #[error("version {version} not found for subject {subject}")]
    VersionNotFound { subject: String, version: u32 },

    /// Referenced schema could not be resolved to a registered version.
    #[error("unresolved schema reference: {name} -> {subject} v{version}")]
    UnresolvedReference {
        name: String,
        subject: String,
        version: u32,
    },

    #[error("invalid compatibility level: {0}")]
    InvalidCompatibilityLevel(String),

    /// Lost a race for first-creation of new content. Retryable: the
    /// winning registration is committed by the time this surfaces.
    #[error("concurrent registration conflict for fingerprint {0}")]
    Conflict(String),

    /// Underlying storage temporarily unreachable. Retryable; no partial
    /// state is left behind.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid wire payload: {0}")]
    Wire(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether a caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Conflict(_) | RegistryError::Unavailable(_))
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
