//! End-to-end registry behavior
//!
//! Exercises the registration coordinator through the public API:
//! idempotency, global deduplication, canonicalization equivalence,
//! monotonic versioning, compatibility enforcement, and convergence of
//! concurrent registrations.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use schema_registry_core::{
    canonical, wire, CompatibilityLevel, RegistryError, SchemaRegistry, SchemaType,
};

const USER_V1: &str = r#"{
    "type": "record",
    "name": "User",
    "fields": [
        {"name": "id", "type": "long"},
        {"name": "name", "type": "string"},
        {"name": "email", "type": ["null", "string"], "default": null}
    ]
}"#;

const USER_V2: &str = r#"{
    "type": "record",
    "name": "User",
    "fields": [
        {"name": "id", "type": "long"},
        {"name": "name", "type": "string"},
        {"name": "email", "type": ["null", "string"], "default": null},
        {"name": "timestamp", "type": "long", "default": 0}
    ]
}"#;

fn registry() -> SchemaRegistry {
    SchemaRegistry::new(CompatibilityLevel::Backward)
}

#[test]
fn idempotent_registration_returns_identical_pair() {
    let registry = registry();
    let first = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    let second = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.versions("orders-value").unwrap(), vec![1]);
}

#[test]
fn global_dedup_across_subjects() {
    let registry = registry();
    let orders = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    let events = registry
        .register("events-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    assert_eq!(orders.id, events.id, "identical content shares one global ID");
    assert_eq!(registry.schema_count(), 1);
    // Each subject still gets its own version 1.
    assert_eq!(orders.version, 1);
    assert_eq!(events.version, 1);
}

#[test]
fn canonicalization_equivalence_across_formatting() {
    let registry = registry();
    let reformatted = USER_V1.split_whitespace().collect::<Vec<_>>().join(" ");

    let original = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    let transformed = registry
        .register("events-value", SchemaType::Avro, &reformatted, &[])
        .unwrap();
    assert_eq!(original.id, transformed.id);
}

#[test]
fn monotonic_versioning_and_increasing_ids() {
    let registry = registry();

    // Pairwise-distinct compatible evolutions: each adds a defaulted field.
    let schemas = [
        r#"{"type": "record", "name": "Grow", "fields": [
            {"name": "a", "type": "string"}
        ]}"#,
        r#"{"type": "record", "name": "Grow", "fields": [
            {"name": "a", "type": "string"},
            {"name": "b", "type": "long", "default": 0}
        ]}"#,
        r#"{"type": "record", "name": "Grow", "fields": [
            {"name": "a", "type": "string"},
            {"name": "b", "type": "long", "default": 0},
            {"name": "c", "type": ["null", "string"], "default": null}
        ]}"#,
    ];

    let mut last_id = 0;
    for (i, schema) in schemas.iter().enumerate() {
        let registered = registry
            .register("grow-value", SchemaType::Avro, schema, &[])
            .unwrap();
        assert_eq!(registered.version as usize, i + 1);
        assert!(registered.id > last_id, "IDs strictly increase");
        last_id = registered.id;
    }
    assert_eq!(registry.versions("grow-value").unwrap(), vec![1, 2, 3]);
}

#[test]
fn backward_incompatible_change_is_rejected() {
    let registry = registry();
    registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();

    // Union-with-null collapses to a plain scalar: old nulls become
    // unreadable.
    let narrowed = r#"{
        "type": "record",
        "name": "User",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "name", "type": "string"},
            {"name": "email", "type": "string", "default": ""}
        ]
    }"#;
    let err = registry
        .register("orders-value", SchemaType::Avro, narrowed, &[])
        .unwrap_err();
    let RegistryError::Incompatible { violations } = err else {
        panic!("expected incompatibility, got something else");
    };
    assert!(!violations.is_empty());
    // The rendered reason is what transport layers pattern-match on.
    let reason = RegistryError::Incompatible { violations }.to_string();
    assert!(reason.contains("incompatible"));

    // Adding a defaulted field is accepted.
    let accepted = registry
        .register("orders-value", SchemaType::Avro, USER_V2, &[])
        .unwrap();
    assert_eq!(accepted.version, 2);
}

#[test]
fn concurrent_identical_registrations_converge() {
    let registry = Arc::new(registry());
    let threads = 12;

    let mut handles = Vec::new();
    for _ in 0..threads {
        let registry = registry.clone();
        handles.push(thread::spawn(move || {
            registry.register("fresh-value", SchemaType::Avro, USER_V1, &[])
        }));
    }

    let mut results = HashSet::new();
    for handle in handles {
        let registered = handle.join().unwrap().unwrap();
        results.insert((registered.id, registered.version));
    }

    assert_eq!(results.len(), 1, "all callers observe one (id, version)");
    assert_eq!(registry.versions("fresh-value").unwrap(), vec![1]);
    assert_eq!(registry.schema_count(), 1);
}

#[test]
fn concurrent_distinct_subjects_dedup_to_one_id() {
    let registry = Arc::new(registry());
    let threads = 10;

    let mut handles = Vec::new();
    for i in 0..threads {
        let registry = registry.clone();
        handles.push(thread::spawn(move || {
            let subject = format!("subject-{}-value", i);
            registry.register(&subject, SchemaType::Avro, USER_V1, &[])
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.join().unwrap().unwrap().id);
    }
    assert_eq!(ids.len(), 1, "cross-subject races converge on one ID");
    assert_eq!(registry.schema_count(), 1);
}

#[test]
fn round_trip_preserves_canonical_form() {
    let registry = registry();
    let registered = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();

    let stored = registry.schema_by_id(registered.id).unwrap();
    let expected = canonical::canonicalize(SchemaType::Avro, USER_V1, &[]).unwrap();
    assert_eq!(stored.canonical_form, expected);
    // Canonicalization is a fixed point.
    assert_eq!(
        canonical::canonicalize(SchemaType::Avro, &stored.canonical_form, &[]).unwrap(),
        expected
    );
}

#[test]
fn literal_user_scenario() {
    // Register User under "orders-value", the same content under
    // "events-value", then evolve with a defaulted timestamp field.
    let registry = registry();

    let orders = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    assert!(orders.id > 0);

    let events = registry
        .register("events-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    assert_eq!(events.id, orders.id);

    let evolved = registry
        .register("orders-value", SchemaType::Avro, USER_V2, &[])
        .unwrap();
    assert!(evolved.id > orders.id);
    assert_eq!(evolved.version, 2);
}

#[test]
fn reregistering_older_version_appends_new_version_with_same_id() {
    let registry = registry();
    let v1 = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    registry
        .register("orders-value", SchemaType::Avro, USER_V2, &[])
        .unwrap();

    // The old content is no longer the tip, so a new version is appended,
    // reusing the existing global ID.
    let again = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();
    assert_eq!(again.id, v1.id);
    assert_eq!(again.version, 3);
    assert_eq!(registry.versions("orders-value").unwrap(), vec![1, 2, 3]);
}

#[test]
fn json_schema_end_to_end() {
    let registry = registry();
    let v1 = r#"{
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Order",
        "type": "object",
        "properties": {
            "orderId": {"type": "string"},
            "amount": {"type": "number"}
        },
        "required": ["orderId"]
    }"#;
    let registered = registry
        .register("json-orders-value", SchemaType::Json, v1, &[])
        .unwrap();
    assert_eq!(registered.version, 1);

    // Requiring amount is a backward violation.
    let tightened = v1.replace(r#""required": ["orderId"]"#, r#""required": ["orderId", "amount"]"#);
    assert!(registry
        .register("json-orders-value", SchemaType::Json, &tightened, &[])
        .is_err());

    // Adding an optional property is accepted.
    let widened = v1.replace(
        r#""amount": {"type": "number"}"#,
        r#""amount": {"type": "number"}, "note": {"type": "string"}"#,
    );
    let evolved = registry
        .register("json-orders-value", SchemaType::Json, &widened, &[])
        .unwrap();
    assert_eq!(evolved.version, 2);
}

#[test]
fn protobuf_end_to_end() {
    let registry = registry();
    let v1 = r#"
        syntax = "proto3";
        package com.example;
        message Event {
            string id = 1;
            int64 occurred_at = 2;
        }
    "#;
    let registered = registry
        .register("proto-events-value", SchemaType::Protobuf, v1, &[])
        .unwrap();
    assert_eq!(registered.version, 1);

    // Changing a field's wire type on the same number is rejected.
    let broken = v1.replace("string id = 1;", "int64 id = 1;");
    let err = registry
        .register("proto-events-value", SchemaType::Protobuf, &broken, &[])
        .unwrap_err();
    assert!(err.to_string().contains("incompatible"));

    // Adding a field with a new number is accepted.
    let extended = v1.replace("int64 occurred_at = 2;", "int64 occurred_at = 2;\nstring source = 3;");
    let evolved = registry
        .register("proto-events-value", SchemaType::Protobuf, &extended, &[])
        .unwrap();
    assert_eq!(evolved.version, 2);
}

#[test]
fn wire_frame_carries_registered_id() {
    let registry = registry();
    let registered = registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();

    let payload = b"\x02\x08avro-bin";
    let framed = wire::encode(registered.id, None, payload);
    assert_eq!(framed[0], wire::MAGIC_BYTE);

    let (id, rest) = wire::decode_prefix(&framed).unwrap();
    assert_eq!(id, registered.id);
    assert_eq!(rest, payload);

    // The ID decoded from the frame resolves back to the schema.
    let schema = registry.schema_by_id(id).unwrap();
    assert_eq!(schema.schema_type, SchemaType::Avro);
}

#[test]
fn subjects_listing_is_sorted() {
    let registry = registry();
    for subject in ["zebra-value", "alpha-value", "middle-value"] {
        registry
            .register(subject, SchemaType::Avro, USER_V1, &[])
            .unwrap();
    }
    assert_eq!(
        registry.subjects(),
        vec!["alpha-value", "middle-value", "zebra-value"]
    );
}

#[test]
fn global_level_change_applies_to_unconfigured_subjects() {
    let registry = registry();
    registry
        .register("orders-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();

    let breaking = USER_V1.replace(
        r#"{"name": "id", "type": "long"}"#,
        r#"{"name": "id", "type": "string"}"#,
    );
    assert!(registry
        .register("orders-value", SchemaType::Avro, &breaking, &[])
        .is_err());

    registry.set_global_compatibility(CompatibilityLevel::None);
    registry
        .register("orders-value", SchemaType::Avro, &breaking, &[])
        .unwrap();
    assert_eq!(registry.global_compatibility(), CompatibilityLevel::None);
}

#[test]
fn referenced_avro_subject_can_evolve() {
    // Compatibility checks on a subject whose schemas reference named types
    // from other subjects must resolve those references for the stored
    // priors too, not just the candidate.
    use schema_registry_core::SchemaReference;

    let registry = registry();
    let address = r#"{
        "type": "record",
        "name": "Address",
        "namespace": "com.example",
        "fields": [
            {"name": "street", "type": "string"},
            {"name": "city", "type": "string"}
        ]
    }"#;
    registry
        .register("address-value", SchemaType::Avro, address, &[])
        .unwrap();

    let refs = [SchemaReference::new(
        "com.example.Address",
        "address-value",
        1,
    )];
    let person_v1 = r#"{
        "type": "record",
        "name": "Person",
        "namespace": "com.example",
        "fields": [
            {"name": "name", "type": "string"},
            {"name": "home", "type": "com.example.Address"}
        ]
    }"#;
    registry
        .register("person-value", SchemaType::Avro, person_v1, &refs)
        .unwrap();

    // Adding a defaulted field is compatible; checking it requires parsing
    // the stored v1 with Address in scope.
    let person_v2 = r#"{
        "type": "record",
        "name": "Person",
        "namespace": "com.example",
        "fields": [
            {"name": "name", "type": "string"},
            {"name": "home", "type": "com.example.Address"},
            {"name": "nickname", "type": "string", "default": ""}
        ]
    }"#;
    let evolved = registry
        .register("person-value", SchemaType::Avro, person_v2, &refs)
        .unwrap();
    assert_eq!(evolved.version, 2);

    // A breaking change must surface as an incompatibility, not a parse
    // failure on the prior.
    let person_v3 = r#"{
        "type": "record",
        "name": "Person",
        "namespace": "com.example",
        "fields": [
            {"name": "name", "type": "string"},
            {"name": "home", "type": "com.example.Address"},
            {"name": "nickname", "type": "string", "default": ""},
            {"name": "age", "type": "long"}
        ]
    }"#;
    let err = registry
        .register("person-value", SchemaType::Avro, person_v3, &refs)
        .unwrap_err();
    assert!(matches!(err, RegistryError::Incompatible { .. }));
}

#[test]
fn reads_proceed_during_registration_bursts() {
    // Lookups must not serialize behind in-flight registrations; a reader
    // hammering the subject while a writer registers a chain of evolutions
    // should always see a consistent prefix of versions.
    let registry = Arc::new(registry());
    registry
        .register("busy-value", SchemaType::Avro, USER_V1, &[])
        .unwrap();

    let rounds = 20;
    let writer = {
        let registry = registry.clone();
        thread::spawn(move || {
            let mut fields = vec![
                r#"{"name": "id", "type": "long"}"#.to_string(),
                r#"{"name": "name", "type": "string"}"#.to_string(),
                r#"{"name": "email", "type": ["null", "string"], "default": null}"#.to_string(),
            ];
            for i in 0..rounds {
                fields.push(format!(
                    r#"{{"name": "extra{}", "type": "long", "default": 0}}"#,
                    i
                ));
                let schema = format!(
                    r#"{{"type": "record", "name": "User", "fields": [{}]}}"#,
                    fields.join(", ")
                );
                registry
                    .register("busy-value", SchemaType::Avro, &schema, &[])
                    .unwrap();
            }
        })
    };

    let reader = {
        let registry = registry.clone();
        thread::spawn(move || {
            let mut seen = 0;
            while seen < rounds + 1 {
                let versions = registry.versions("busy-value").unwrap();
                assert_eq!(
                    versions,
                    (1..=versions.len() as u32).collect::<Vec<_>>(),
                    "version list is always a gapless prefix"
                );
                let (latest, _) = registry.latest("busy-value").unwrap();
                assert_eq!(latest.version as usize, versions.len());
                seen = versions.len();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(
        registry.versions("busy-value").unwrap().len(),
        rounds + 1
    );
}

#[test]
fn protobuf_reference_identity_is_distinct() {
    // The same text with different references must register as different
    // content.
    use schema_registry_core::SchemaReference;

    let registry = registry();
    let common = r#"
        syntax = "proto3";
        message Shared { string id = 1; }
    "#;
    registry
        .register("shared-value", SchemaType::Protobuf, common, &[])
        .unwrap();

    let importer = r#"
        syntax = "proto3";
        import "shared.proto";
        message Wrapper { string shared_id = 1; }
    "#;
    let without_ref = registry
        .register("plain-value", SchemaType::Protobuf, importer, &[])
        .unwrap();
    let with_ref = registry
        .register(
            "ref-value",
            SchemaType::Protobuf,
            importer,
            &[SchemaReference::new("shared.proto", "shared-value", 1)],
        )
        .unwrap();
    assert_ne!(without_ref.id, with_ref.id);
}
