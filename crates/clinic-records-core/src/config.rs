//! Configuration file handling.
//!
//! Settings are read from a TOML file such as `clinic-records.toml`. Every
//! section and key is optional and falls back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{AttributeKind, NATIONAL_ID, UNKNOWN_ID};
use crate::report::WeekAlignment;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Remote directory settings.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Reference types seeded on startup.
    #[serde(default)]
    pub reference: ReferenceConfig,
}

/// SQLite store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("clinic-records.db")
}

/// Report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where week buckets start.
    #[serde(default)]
    pub week_alignment: WeekAlignment,

    /// Concept whose answers are diagnoses.
    #[serde(default = "default_diagnosis_concept")]
    pub diagnosis_concept: String,

    /// Concept whose answers are referral destinations.
    #[serde(default = "default_referral_concept")]
    pub referral_concept: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            week_alignment: WeekAlignment::default(),
            diagnosis_concept: default_diagnosis_concept(),
            referral_concept: default_referral_concept(),
        }
    }
}

fn default_diagnosis_concept() -> String {
    "Diagnosis".to_string()
}

fn default_referral_concept() -> String {
    "Referral".to_string()
}

/// Remote directory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote demographics servers, as `host` or `host:port`.
    #[serde(default)]
    pub servers: Vec<String>,
}

/// Attribute and identifier types registered when the store opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "default_attribute_types")]
    pub attribute_types: Vec<String>,

    #[serde(default = "default_identifier_types")]
    pub identifier_types: Vec<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            attribute_types: default_attribute_types(),
            identifier_types: default_identifier_types(),
        }
    }
}

fn default_attribute_types() -> Vec<String> {
    AttributeKind::ALL
        .iter()
        .map(|k| k.type_name().to_string())
        .collect()
}

fn default_identifier_types() -> Vec<String> {
    vec![NATIONAL_ID.to_string(), UNKNOWN_ID.to_string()]
}

impl ClinicConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClinicConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded clinic configuration");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = ClinicConfig::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
