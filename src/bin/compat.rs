//! Schema Compatibility CLI
//!
//! Canonicalizes schemas, computes fingerprints, and checks compatibility
//! between two schema files without a running registry.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use schema_registry_core::compat::{self, CanonicalSchema, CompatibilityLevel};
use schema_registry_core::{canonical, Fingerprint, SchemaType};

#[derive(Parser)]
#[command(name = "schema-compat")]
#[command(about = "Canonicalize schemas and check compatibility")]
struct Cli {
    /// Schema type: AVRO, JSON, or PROTOBUF
    #[arg(short = 't', long, default_value = "AVRO")]
    schema_type: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical form of a schema file
    Canonicalize {
        /// Path to the schema file
        file: PathBuf,
    },

    /// Print the dedup fingerprint of a schema file
    Fingerprint {
        /// Path to the schema file
        file: PathBuf,
    },

    /// Check whether a candidate schema is a compatible evolution
    Check {
        /// Path to the existing schema
        #[arg(short, long)]
        old: PathBuf,
        /// Path to the candidate schema
        #[arg(short, long)]
        new: PathBuf,
        /// Compatibility level to check under
        #[arg(short, long, default_value = "BACKWARD")]
        level: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let schema_type: SchemaType = cli
        .schema_type
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    match cli.command {
        Commands::Canonicalize { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let canonical = canonical::canonicalize(schema_type, &raw, &[])?;
            println!("{}", canonical);
        }
        Commands::Fingerprint { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let canonical = canonical::canonicalize(schema_type, &raw, &[])?;
            println!("{}", Fingerprint::of(schema_type, &canonical, &[]));
        }
        Commands::Check { old, new, level } => {
            let level: CompatibilityLevel = level.parse()?;
            let old_raw = std::fs::read_to_string(&old)
                .with_context(|| format!("reading {}", old.display()))?;
            let new_raw = std::fs::read_to_string(&new)
                .with_context(|| format!("reading {}", new.display()))?;

            let old_canonical = canonical::canonicalize(schema_type, &old_raw, &[])?;
            let new_canonical = canonical::canonicalize(schema_type, &new_raw, &[])?;

            let violations = compat::collect_violations(
                schema_type,
                &CanonicalSchema::new(new_canonical),
                &[CanonicalSchema::new(old_canonical)],
                level,
            )?;
            if violations.is_empty() {
                println!("COMPATIBLE ({})", level);
            } else {
                println!("INCOMPATIBLE ({})", level);
                for violation in &violations {
                    println!("  {}", violation);
                }
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
