//! Configuration for the schema registry core
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (registry.toml)
//! - Environment variables (REGISTRY_*)
//!
//! ## Example config file (registry.toml):
//! ```toml
//! [compatibility]
//! default_level = "BACKWARD"
//!
//! [limits]
//! max_schema_bytes = 1048576
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compat::CompatibilityLevel;
use crate::error::{RegistryError, Result};

/// Main configuration for the registry core
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub compatibility: CompatibilityConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Compatibility policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityConfig {
    /// Global default compatibility level, overridable per subject at
    /// runtime. Unrecognized values fail validation at load time.
    #[serde(default = "default_level")]
    pub default_level: String,
}

/// Input size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted raw schema text size in bytes
    #[serde(default = "default_max_schema_bytes")]
    pub max_schema_bytes: usize,
}

fn default_level() -> String {
    "BACKWARD".to_string()
}

fn default_max_schema_bytes() -> usize {
    1024 * 1024
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            default_level: default_level(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_schema_bytes: default_max_schema_bytes(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from an optional file plus `REGISTRY_*`
    /// environment variables layered on top of the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("registry").required(false));
        }
        builder = builder.add_source(Environment::with_prefix("REGISTRY").separator("__"));

        let config: RegistryConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Fails with InvalidCompatibilityLevel on unrecognized input.
        self.default_compatibility()?;
        Ok(())
    }

    /// The configured default level as a typed value.
    pub fn default_compatibility(&self) -> Result<CompatibilityLevel> {
        self.compatibility.default_level.parse()
    }
}
