//! Schema Registry
//!
//! The registration coordinator: canonicalize, fingerprint, dedup lookup,
//! compatibility check, then version and ID assignment, atomically per
//! subject. Each subject carries its readable state behind a `RwLock` and
//! a separate registration mutex: registrations for a subject are
//! serialized by the mutex, while lookups take only brief read locks and
//! never wait out an in-flight compatibility check. Global ID allocation
//! is an atomic counter independent of any subject lock.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::canonical;
use crate::compat::{self, CanonicalSchema, CompatibilityLevel, Violation, ViolationKind};
use crate::error::{RegistryError, Result};
use crate::fingerprint::Fingerprint;
use crate::schema::{
    RegisteredSchema, ResolvedReference, Schema, SchemaId, SchemaReference, SchemaType,
    VersionNumber,
};
use crate::store::SchemaStore;
use crate::subject::{SubjectState, SubjectVersion};

/// Per-subject slot. `state` is what readers see; `registration` is held
/// across a whole registration so the check-then-commit sequence is
/// atomic per subject, without keeping `state` write-locked while prior
/// versions are parsed.
struct SubjectSlot {
    state: RwLock<SubjectState>,
    registration: Mutex<()>,
}

impl SubjectSlot {
    fn new(name: &str) -> Self {
        Self {
            state: RwLock::new(SubjectState::new(name)),
            registration: Mutex::new(()),
        }
    }

    fn has_versions(&self) -> bool {
        !self.state.read().versions().is_empty()
    }
}

/// The schema registry core
pub struct SchemaRegistry {
    store: SchemaStore,
    subjects: DashMap<String, Arc<SubjectSlot>>,
    default_compatibility: RwLock<CompatibilityLevel>,
}

impl SchemaRegistry {
    /// Create a registry with the given global default compatibility level.
    pub fn new(default_compatibility: CompatibilityLevel) -> Self {
        Self {
            store: SchemaStore::new(),
            subjects: DashMap::new(),
            default_compatibility: RwLock::new(default_compatibility),
        }
    }

    /// Register a schema under a subject.
    ///
    /// Idempotent for unchanged content: re-registering the subject's
    /// current schema returns the existing `(id, version)` pair without
    /// appending a version or running the compatibility checker. Content
    /// already registered elsewhere reuses its global ID but still has to
    /// pass this subject's compatibility check before a version is
    /// appended here.
    pub fn register(
        &self,
        subject: &str,
        schema_type: SchemaType,
        raw: &str,
        references: &[SchemaReference],
    ) -> Result<RegisteredSchema> {
        // No side effects before the registration lock: references, parsing
        // and fingerprinting happen first, so a parse failure can never
        // leave partial state.
        let resolved = self.resolve_references(references)?;
        let canonical = canonical::canonicalize(schema_type, raw, &resolved)?;
        let fingerprint = Fingerprint::of(schema_type, &canonical, references);
        let candidate = CanonicalSchema::with_references(canonical, resolved);

        let slot = self.subject_entry(subject);
        let _registration = slot.registration.lock();

        // Dedup is re-checked here, under the per-subject serialization
        // point: the loser of a concurrent identical registration observes
        // the winner's committed version and short-circuits.
        if let Some(id) = self.store.find_by_fingerprint(&fingerprint) {
            let latest = slot.state.read().latest().cloned();
            if let Some(latest) = latest {
                if latest.schema_id == id {
                    debug!(subject, id, version = latest.version, "no-op re-registration");
                    return Ok(RegisteredSchema {
                        id,
                        version: latest.version,
                    });
                }
            }
            // Known content that is not this subject's tip: no allocation,
            // but the subject's compatibility rules still apply.
            self.check_compatibility(&slot, subject, schema_type, &candidate)?;
            let version = slot.state.write().append(id).version;
            info!(subject, id, version, "registered existing schema under new version");
            return Ok(RegisteredSchema { id, version });
        }

        self.check_compatibility(&slot, subject, schema_type, &candidate)?;

        let schema = match self
            .store
            .create(schema_type, candidate.form, references.to_vec())
        {
            Ok(schema) => schema,
            // Another subject committed identical content between our dedup
            // check and the create; converge on its ID.
            Err(RegistryError::Conflict(_)) => {
                debug!(subject, "lost cross-subject creation race, reusing committed ID");
                let id = self
                    .store
                    .find_by_fingerprint(&fingerprint)
                    .ok_or_else(|| {
                        RegistryError::Unavailable(
                            "fingerprint vanished after creation conflict".to_string(),
                        )
                    })?;
                self.store.get_by_id(id)?
            }
            Err(err) => return Err(err),
        };

        let version = slot.state.write().append(schema.id).version;
        info!(subject, id = schema.id, version, "registered new schema");
        Ok(RegisteredSchema {
            id: schema.id,
            version,
        })
    }

    /// Fetch a schema by global ID.
    pub fn schema_by_id(&self, id: SchemaId) -> Result<Arc<Schema>> {
        self.store.get_by_id(id)
    }

    /// All subject names with at least one version, sorted.
    pub fn subjects(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subjects
            .iter()
            .filter(|entry| entry.value().has_versions())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Ordered version numbers for a subject.
    pub fn versions(&self, subject: &str) -> Result<Vec<VersionNumber>> {
        let slot = self.existing_subject(subject)?;
        let state = slot.state.read();
        Ok(state.versions().iter().map(|v| v.version).collect())
    }

    /// A specific version of a subject, with its schema record.
    pub fn schema_by_version(
        &self,
        subject: &str,
        version: VersionNumber,
    ) -> Result<(SubjectVersion, Arc<Schema>)> {
        let slot = self.existing_subject(subject)?;
        let entry = slot
            .state
            .read()
            .version(version)
            .cloned()
            .ok_or_else(|| RegistryError::VersionNotFound {
                subject: subject.to_string(),
                version,
            })?;
        let schema = self.store.get_by_id(entry.schema_id)?;
        Ok((entry, schema))
    }

    /// The latest version of a subject, with its schema record.
    pub fn latest(&self, subject: &str) -> Result<(SubjectVersion, Arc<Schema>)> {
        let slot = self.existing_subject(subject)?;
        let entry = slot
            .state
            .read()
            .latest()
            .cloned()
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))?;
        let schema = self.store.get_by_id(entry.schema_id)?;
        Ok((entry, schema))
    }

    /// Check whether a schema is already registered under a subject,
    /// without registering it. Returns the version it occupies, or `None`
    /// if the content is unknown to this subject.
    pub fn lookup(
        &self,
        subject: &str,
        schema_type: SchemaType,
        raw: &str,
        references: &[SchemaReference],
    ) -> Result<Option<RegisteredSchema>> {
        let resolved = self.resolve_references(references)?;
        let canonical = canonical::canonicalize(schema_type, raw, &resolved)?;
        let fingerprint = Fingerprint::of(schema_type, &canonical, references);

        let Some(id) = self.store.find_by_fingerprint(&fingerprint) else {
            return Ok(None);
        };
        let slot = self.existing_subject(subject)?;
        let state = slot.state.read();
        Ok(state
            .version_of_schema(id)
            .map(|entry| RegisteredSchema {
                id,
                version: entry.version,
            }))
    }

    /// Run the compatibility checker for a candidate without mutating
    /// anything. An empty result means the candidate would be accepted.
    pub fn test_compatibility(
        &self,
        subject: &str,
        schema_type: SchemaType,
        raw: &str,
        references: &[SchemaReference],
    ) -> Result<Vec<Violation>> {
        let resolved = self.resolve_references(references)?;
        let canonical = canonical::canonicalize(schema_type, raw, &resolved)?;
        let candidate = CanonicalSchema::with_references(canonical, resolved);

        let slot = self.existing_subject(subject)?;
        let level = self.effective_level(&slot);
        if self.format_changed(&slot, schema_type, level)? {
            return Ok(vec![format_changed_violation(subject)]);
        }
        let priors = self.prior_schemas(&slot, schema_type)?;
        compat::collect_violations(schema_type, &candidate, &priors, level)
    }

    /// Global default compatibility level.
    pub fn global_compatibility(&self) -> CompatibilityLevel {
        *self.default_compatibility.read()
    }

    /// Set the global default compatibility level.
    pub fn set_global_compatibility(&self, level: CompatibilityLevel) {
        info!(level = %level, "global compatibility updated");
        *self.default_compatibility.write() = level;
    }

    /// Per-subject compatibility override, if one is set.
    pub fn subject_compatibility(&self, subject: &str) -> Result<Option<CompatibilityLevel>> {
        let slot = self.existing_subject(subject)?;
        let state = slot.state.read();
        Ok(state.compatibility)
    }

    /// Set a per-subject compatibility override. The override may be set
    /// before the subject's first registration; the subject stays
    /// invisible to lookups until it has versions.
    pub fn set_subject_compatibility(&self, subject: &str, level: CompatibilityLevel) {
        info!(subject, level = %level, "subject compatibility updated");
        let slot = self.subject_entry(subject);
        slot.state.write().compatibility = Some(level);
    }

    /// Number of distinct schemas registered across all subjects.
    pub fn schema_count(&self) -> usize {
        self.store.len()
    }

    fn subject_entry(&self, subject: &str) -> Arc<SubjectSlot> {
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| Arc::new(SubjectSlot::new(subject)))
            .clone()
    }

    /// A subject exists for lookups only once it has versions; a slot
    /// created solely by a compatibility override is not found.
    fn existing_subject(&self, subject: &str) -> Result<Arc<SubjectSlot>> {
        self.subjects
            .get(subject)
            .map(|entry| entry.value().clone())
            .filter(|slot| slot.has_versions())
            .ok_or_else(|| RegistryError::SubjectNotFound(subject.to_string()))
    }

    fn effective_level(&self, slot: &SubjectSlot) -> CompatibilityLevel {
        slot.state
            .read()
            .compatibility
            .unwrap_or_else(|| *self.default_compatibility.read())
    }

    /// Canonical forms of the subject's prior versions that share the
    /// candidate's format, oldest first, each with its references
    /// resolved so the checker can re-parse it.
    fn prior_schemas(
        &self,
        slot: &SubjectSlot,
        schema_type: SchemaType,
    ) -> Result<Vec<CanonicalSchema>> {
        let ids: Vec<SchemaId> = slot
            .state
            .read()
            .versions()
            .iter()
            .map(|v| v.schema_id)
            .collect();
        let mut priors = Vec::new();
        for id in ids {
            let schema = self.store.get_by_id(id)?;
            if schema.schema_type == schema_type {
                let references = self.resolve_references(&schema.references)?;
                priors.push(CanonicalSchema::with_references(
                    schema.canonical_form.clone(),
                    references,
                ));
            }
        }
        Ok(priors)
    }

    /// A format switch on a subject is only allowed under NONE.
    fn format_changed(
        &self,
        slot: &SubjectSlot,
        schema_type: SchemaType,
        level: CompatibilityLevel,
    ) -> Result<bool> {
        if level == CompatibilityLevel::None {
            return Ok(false);
        }
        let latest = slot.state.read().latest().cloned();
        match latest {
            Some(latest) => {
                let schema = self.store.get_by_id(latest.schema_id)?;
                Ok(schema.schema_type != schema_type)
            }
            None => Ok(false),
        }
    }

    fn check_compatibility(
        &self,
        slot: &SubjectSlot,
        subject: &str,
        schema_type: SchemaType,
        candidate: &CanonicalSchema,
    ) -> Result<()> {
        let level = self.effective_level(slot);
        if self.format_changed(slot, schema_type, level)? {
            warn!(subject, "rejected: schema format changed");
            return Err(RegistryError::Incompatible {
                violations: vec![format_changed_violation(subject)],
            });
        }
        let priors = self.prior_schemas(slot, schema_type)?;
        let result = compat::check(schema_type, candidate, &priors, level);
        if let Err(RegistryError::Incompatible { violations }) = &result {
            warn!(
                subject,
                level = %level,
                violations = violations.len(),
                "rejected incompatible schema"
            );
        }
        result
    }

    fn resolve_references(
        &self,
        references: &[SchemaReference],
    ) -> Result<Vec<ResolvedReference>> {
        references
            .iter()
            .map(|reference| {
                let unresolved = || RegistryError::UnresolvedReference {
                    name: reference.name.clone(),
                    subject: reference.subject.clone(),
                    version: reference.version,
                };
                let slot = self
                    .subjects
                    .get(&reference.subject)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(unresolved)?;
                let entry = slot
                    .state
                    .read()
                    .version(reference.version)
                    .cloned()
                    .ok_or_else(unresolved)?;
                let schema = self.store.get_by_id(entry.schema_id)?;
                Ok(ResolvedReference {
                    name: reference.name.clone(),
                    schema_id: schema.id,
                    canonical_form: schema.canonical_form.clone(),
                })
            })
            .collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(CompatibilityLevel::Backward)
    }
}

fn format_changed_violation(subject: &str) -> Violation {
    Violation::new(
        subject,
        ViolationKind::FormatChanged,
        "schema format differs from the subject's latest version",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_V1: &str = r#"{
        "type": "record",
        "name": "User",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "name", "type": "string"}
        ]
    }"#;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(CompatibilityLevel::Backward)
    }

    #[test]
    fn test_first_registration_creates_version_one() {
        let registry = registry();
        let registered = registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        assert_eq!(registered.version, 1);
        assert!(registered.id > 0);
        assert_eq!(registry.versions("users-value").unwrap(), vec![1]);
    }

    #[test]
    fn test_reregistration_is_idempotent() {
        let registry = registry();
        let first = registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        let second = registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.versions("users-value").unwrap(), vec![1]);
    }

    #[test]
    fn test_parse_failure_has_no_side_effects() {
        let registry = registry();
        let err = registry
            .register("users-value", SchemaType::Avro, "{broken", &[])
            .unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
        assert_eq!(registry.schema_count(), 0);
        // The subject was never materialized with versions.
        assert!(registry.subjects().is_empty());
    }

    #[test]
    fn test_unknown_subject_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry.versions("missing-value").unwrap_err(),
            RegistryError::SubjectNotFound(_)
        ));
    }

    #[test]
    fn test_subject_override_takes_precedence() {
        let registry = registry();
        registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();

        // Incompatible change: id becomes a string.
        let breaking = USER_V1.replace(r#"{"name": "id", "type": "long"}"#, r#"{"name": "id", "type": "string"}"#);
        assert!(registry
            .register("users-value", SchemaType::Avro, &breaking, &[])
            .is_err());

        registry.set_subject_compatibility("users-value", CompatibilityLevel::None);
        registry
            .register("users-value", SchemaType::Avro, &breaking, &[])
            .unwrap();
        assert_eq!(registry.versions("users-value").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_config_only_subject_is_not_found() {
        let registry = registry();
        registry.set_subject_compatibility("pending-value", CompatibilityLevel::None);

        // An override alone does not make the subject visible.
        assert!(matches!(
            registry.versions("pending-value").unwrap_err(),
            RegistryError::SubjectNotFound(_)
        ));
        assert!(registry.subjects().is_empty());

        // The override still applies once the subject has versions.
        registry
            .register("pending-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        let breaking = USER_V1.replace(r#"{"name": "id", "type": "long"}"#, r#"{"name": "id", "type": "string"}"#);
        registry
            .register("pending-value", SchemaType::Avro, &breaking, &[])
            .unwrap();
        assert_eq!(registry.versions("pending-value").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_format_switch_rejected_outside_none() {
        let registry = registry();
        registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        let err = registry
            .register(
                "users-value",
                SchemaType::Json,
                r#"{"type": "object"}"#,
                &[],
            )
            .unwrap_err();
        let RegistryError::Incompatible { violations } = err else {
            panic!("expected incompatibility");
        };
        assert_eq!(violations[0].kind, ViolationKind::FormatChanged);
    }

    #[test]
    fn test_lookup_finds_registered_content() {
        let registry = registry();
        let registered = registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();

        // Differently formatted but canonically identical text.
        let reformatted = USER_V1.replace("\n", " ");
        let found = registry
            .lookup("users-value", SchemaType::Avro, &reformatted, &[])
            .unwrap()
            .unwrap();
        assert_eq!(found, registered);

        assert!(registry
            .lookup(
                "users-value",
                SchemaType::Avro,
                r#"{"type": "record", "name": "Other", "fields": []}"#,
                &[]
            )
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_test_compatibility_does_not_mutate() {
        let registry = registry();
        registry
            .register("users-value", SchemaType::Avro, USER_V1, &[])
            .unwrap();
        let breaking = USER_V1.replace(r#"{"name": "id", "type": "long"}"#, r#"{"name": "id", "type": "string"}"#);
        let violations = registry
            .test_compatibility("users-value", SchemaType::Avro, &breaking, &[])
            .unwrap();
        assert!(!violations.is_empty());
        assert_eq!(registry.versions("users-value").unwrap(), vec![1]);
        assert_eq!(registry.schema_count(), 1);
    }

    #[test]
    fn test_reference_resolution_failure() {
        let registry = registry();
        let err = registry
            .register(
                "users-value",
                SchemaType::Avro,
                USER_V1,
                &[SchemaReference::new("com.example.Missing", "missing-value", 1)],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnresolvedReference { .. }));
    }
}
