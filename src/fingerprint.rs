//! Fingerprints for schema deduplication
//!
//! A fingerprint is a SHA-256 digest over a schema's identity tuple: the
//! type tag, the canonical form, and the resolved reference identities.
//! It is used only as a dedup lookup key, never persisted as identity
//! itself, so the digest function can change without changing which
//! schemas are considered equal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::schema::{SchemaReference, SchemaType};

/// SHA-256 fingerprint of a schema's identity tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `(type, canonical_form, references)`.
    ///
    /// Equal inputs always yield equal output; this is the sole key used
    /// by the schema store's dedup index.
    pub fn of(
        schema_type: SchemaType,
        canonical_form: &str,
        references: &[SchemaReference],
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(schema_type.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_form.as_bytes());
        for reference in references {
            hasher.update([0u8]);
            hasher.update(reference.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(reference.subject.as_bytes());
            hasher.update([0u8]);
            hasher.update(reference.version.to_be_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
