//! Schema Registry Core
//!
//! A Confluent-wire-compatible schema registry engine: versioned schema
//! storage with global deduplication, per-format canonicalization, and
//! compatibility checking for Avro, JSON Schema, and Protobuf.
//!
//! ## Features
//!
//! - **Global Deduplication**: identical schema content maps to one global
//!   ID regardless of which subject registered it first
//! - **Canonicalization**: formatting differences collapse to identity
//!   before fingerprinting, per format
//! - **Compatibility Checking**: seven Confluent compatibility levels with
//!   format-specific evolution rules
//! - **Append-Only Versioning**: per-subject version lists, 1-based and
//!   gapless, never renumbered
//! - **Wire Framing**: the magic-byte + big-endian schema ID prefix
//!   consumed by producer/consumer serializers
//!
//! ## Registration flow
//!
//! ```text
//! register(subject, type, text, refs)
//!   ├── canonicalize ──► ParseError (no side effects)
//!   ├── fingerprint ──► dedup lookup
//!   │     └── already the subject's latest? return existing (id, version)
//!   ├── compatibility check against prior versions ──► IncompatibleSchema
//!   └── allocate ID (if new content) + append version, atomically
//!       under the subject's lock
//! ```

pub mod canonical;
pub mod compat;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod schema;
pub mod store;
pub mod subject;
pub mod wire;

pub use compat::{CanonicalSchema, CompatibilityLevel, Violation, ViolationKind};
pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use fingerprint::Fingerprint;
pub use registry::SchemaRegistry;
pub use schema::{
    RegisteredSchema, Schema, SchemaId, SchemaReference, SchemaType, VersionNumber,
};
pub use subject::SubjectVersion;
