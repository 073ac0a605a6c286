//! Schema store and ID allocation
//!
//! The store owns every schema record: a dedup index from fingerprint to
//! global ID, and the ID-to-record map. Records are immutable once
//! created and IDs are never reused; identical content always maps to the
//! same ID regardless of which subject registered it first.
//!
//! This is the narrow interface behind which a durable backend would sit;
//! the in-memory maps here have the same atomicity contract a transactional
//! backend provides, with the fingerprint entry acting as the commit point
//! so an allocated ID whose insert loses a race is wasted rather than
//! duplicated.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{RegistryError, Result};
use crate::fingerprint::Fingerprint;
use crate::schema::{Schema, SchemaId, SchemaReference, SchemaType};

/// Issues strictly increasing, globally unique schema IDs.
///
/// Safe under arbitrary concurrent callers; gaps are permitted (an ID
/// consumed by an aborted registration is simply never seen again) but no
/// value is ever issued twice.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> SchemaId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory schema store with a global dedup index
pub struct SchemaStore {
    ids: IdAllocator,
    by_fingerprint: DashMap<Fingerprint, SchemaId>,
    by_id: DashMap<SchemaId, Arc<Schema>>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            by_fingerprint: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// Look up the global ID for a fingerprint, if the content is already
    /// registered. Lock-free read; never blocks on registration.
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<SchemaId> {
        self.by_fingerprint.get(fingerprint).map(|entry| *entry)
    }

    /// Create a schema record for content not yet registered.
    ///
    /// Allocates a fresh ID and installs the record under the fingerprint
    /// atomically. If another caller committed the same fingerprint first,
    /// the allocation is abandoned and `Conflict` is returned; the caller
    /// re-reads the now-committed state and converges.
    pub fn create(
        &self,
        schema_type: SchemaType,
        canonical_form: String,
        references: Vec<SchemaReference>,
    ) -> Result<Arc<Schema>> {
        let fingerprint = Fingerprint::of(schema_type, &canonical_form, &references);
        match self.by_fingerprint.entry(fingerprint.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Conflict(fingerprint.to_string())),
            Entry::Vacant(vacant) => {
                let id = self.ids.next();
                let schema = Arc::new(Schema {
                    id,
                    schema_type,
                    canonical_form,
                    references,
                    created_at: Utc::now(),
                });
                // Record first, index second: a fingerprint hit always
                // finds its record.
                self.by_id.insert(id, schema.clone());
                vacant.insert(id);
                Ok(schema)
            }
        }
    }

    /// Fetch a schema record by global ID.
    pub fn get_by_id(&self, id: SchemaId) -> Result<Arc<Schema>> {
        self.by_id
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(RegistryError::SchemaNotFound(id))
    }

    /// Number of distinct schemas registered.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}
