//! Subject state: an append-only list of versions
//!
//! A subject is a named container of versions, each pointing at a global
//! schema ID. Version numbers are 1-based, strictly increasing by one,
//! and never reused or renumbered. Subjects are created on first
//! registration and never implicitly deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compat::CompatibilityLevel;
use crate::schema::{SchemaId, VersionNumber};

/// One version entry under a subject. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectVersion {
    pub subject: String,
    pub version: VersionNumber,
    pub schema_id: SchemaId,
    pub registered_at: DateTime<Utc>,
}

/// Mutable per-subject state, guarded by the registry's per-subject lock.
#[derive(Debug)]
pub struct SubjectState {
    pub name: String,
    versions: Vec<SubjectVersion>,
    /// Per-subject compatibility override; `None` falls back to the
    /// registry's global default.
    pub compatibility: Option<CompatibilityLevel>,
}

impl SubjectState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
            compatibility: None,
        }
    }

    /// All versions in registration order.
    pub fn versions(&self) -> &[SubjectVersion] {
        &self.versions
    }

    pub fn latest(&self) -> Option<&SubjectVersion> {
        self.versions.last()
    }

    pub fn version(&self, number: VersionNumber) -> Option<&SubjectVersion> {
        // Version numbers are gapless and 1-based, so index directly.
        self.versions.get(number.checked_sub(1)? as usize)
    }

    /// Find the version holding a given schema ID, if any.
    pub fn version_of_schema(&self, schema_id: SchemaId) -> Option<&SubjectVersion> {
        self.versions.iter().find(|v| v.schema_id == schema_id)
    }

    /// Append a new version pointing at `schema_id`, assigning the next
    /// version number.
    pub fn append(&mut self, schema_id: SchemaId) -> SubjectVersion {
        let entry = SubjectVersion {
            subject: self.name.clone(),
            version: self.versions.len() as VersionNumber + 1,
            schema_id,
            registered_at: Utc::now(),
        };
        self.versions.push(entry.clone());
        entry
    }
}
