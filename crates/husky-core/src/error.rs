//! Common error types shared by the husky crates.
//!
//! Storage errors come from the blob store client; configuration errors from
//! loading, interpolating and validating YAML configuration.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// Failed to read a local file that should be uploaded.
    #[snafu(display("Failed to read local file {path}: {source}"))]
    ReadLocal {
        path: String,
        source: std::io::Error,
    },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error: {source}"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error: {source}"))]
    GcsConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// A required value is missing or empty.
    #[snafu(display("Missing required setting: {setting}"))]
    MissingSetting { setting: String },

    /// Multiple validation errors occurred.
    #[snafu(display("Invalid configuration:\n{}", errors.join("\n")))]
    Invalid { errors: Vec<String> },
}

impl ConfigError {
    /// Collapse a list of validation messages into a single error.
    ///
    /// Returns `Ok(())` when the list is empty.
    pub fn from_messages(errors: Vec<String>) -> Result<(), ConfigError> {
        if errors.is_empty() {
            Ok(())
        } else {
            InvalidSnafu { errors }.fail()
        }
    }
}
