//! Error types for the husky loader.
//!
//! Statement and connection failures are raised by the warehouse layer and
//! wrapped by the phase that issued them. Nothing here escapes
//! [`crate::pipeline::run`]: the orchestrator converts every [`RunError`]
//! into the failure shape of the run report.

use snafu::prelude::*;

// Re-export common errors
pub use husky_core::error::{ConfigError, StorageError};

/// Identifier validation failures.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum IdentError {
    /// Identifier is empty.
    #[snafu(display("Identifier must not be empty"))]
    Empty,

    /// Identifier exceeds the warehouse limit.
    #[snafu(display("Identifier '{name}' is {len} characters long, the maximum is {max}"))]
    TooLong { name: String, len: usize, max: usize },

    /// Identifier contains a control character.
    #[snafu(display("Identifier '{name}' contains a control character"))]
    ControlCharacter { name: String },

    /// Staged file path contains characters that cannot appear in a stage reference.
    #[snafu(display(
        "Staged file path '{path}' may only contain letters, digits and the characters _ - . / ="
    ))]
    StagePath { path: String },

    /// Unknown column type.
    #[snafu(display("Unknown column type '{value}'"))]
    ColumnType { value: String },
}

/// Errors raised by a warehouse connection.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },

    /// HTTP request failed before a response was received.
    #[snafu(display("Request to {url} failed: {source}"))]
    Request { url: String, source: reqwest::Error },

    /// Response body could not be decoded.
    #[snafu(display("Failed to decode response from {url}: {source}"))]
    Decode { url: String, source: reqwest::Error },

    /// Unexpected HTTP status without a structured error body.
    #[snafu(display("Warehouse returned HTTP {status}: {body}"))]
    HttpStatus { status: u16, body: String },

    /// The warehouse rejected the credentials.
    #[snafu(display("Authentication failed: {message}"))]
    Authentication { message: String },

    /// The statement was compiled or executed and failed.
    #[snafu(display("SQL error {code} ({sql_state}): {message}"))]
    Statement {
        code: String,
        sql_state: String,
        message: String,
    },

    /// The statement did not finish within the configured timeout.
    #[snafu(display("Statement {handle} did not complete within {seconds}s"))]
    Timeout { handle: String, seconds: u64 },

    /// Reading a staged file failed.
    #[snafu(display("Failed to read staged file {location}: {source}"))]
    StagedFile {
        location: String,
        source: StorageError,
    },

    /// Failed to open the storage behind a stage or catalog snapshot.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Failed to encode or decode the catalog snapshot.
    #[snafu(display("Invalid catalog snapshot: {source}"))]
    Snapshot { source: serde_json::Error },

    /// Invalid connection settings.
    #[snafu(display("Invalid connection settings: {message}"))]
    Connection { message: String },
}

impl WarehouseError {
    /// Build the statement error shape used for missing objects.
    pub fn does_not_exist(kind: &str, name: impl std::fmt::Display) -> Self {
        WarehouseError::Statement {
            code: "002003".to_string(),
            sql_state: "02000".to_string(),
            message: format!(
                "SQL compilation error:\n{kind} '{name}' does not exist or not authorized."
            ),
        }
    }
}

/// Errors raised while ensuring catalog objects exist.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisioningError {
    /// Creating or selecting the database or schema failed.
    #[snafu(display("Failed to create database/schema {namespace}: {source}"))]
    Namespace {
        namespace: String,
        source: WarehouseError,
    },

    /// Creating a file format failed.
    #[snafu(display("Failed to create file format {name}: {source}"))]
    FileFormat {
        name: String,
        source: WarehouseError,
    },

    /// Creating the external stage failed.
    #[snafu(display("Failed to create stage {name}: {source}"))]
    Stage {
        name: String,
        source: WarehouseError,
    },

    /// Creating a table failed.
    #[snafu(display("Failed to create table {table}: {source}"))]
    Table {
        table: String,
        source: WarehouseError,
    },
}

/// Errors raised by a bulk copy.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// The copy statement failed outright.
    #[snafu(display("Failed to load {file} into {table}: {source}"))]
    Copy {
        table: String,
        file: String,
        source: WarehouseError,
    },
}

/// Errors raised while counting rows after a load.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconciliationError {
    /// The count query failed.
    #[snafu(display("Failed to count rows in {table}: {source}"))]
    CountRows {
        table: String,
        source: WarehouseError,
    },

    /// The count query returned something other than a non-negative integer.
    #[snafu(display("Row count for {table} is not a number: {value:?}"))]
    InvalidCount {
        table: String,
        value: Option<String>,
    },

    /// A loaded table has no matching row count.
    #[snafu(display("No row count recorded for {table}"))]
    MissingCount { table: String },
}

/// Top-level run errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// Configuration error.
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    /// Failed to open the warehouse connection.
    #[snafu(display("Failed to connect to warehouse: {source}"))]
    Connect { source: WarehouseError },

    /// Provisioning error.
    #[snafu(display("{source}"))]
    Provisioning { source: ProvisioningError },

    /// A table failed to load and the run was aborted.
    #[snafu(display("{source}"))]
    Load { source: LoadError },

    /// One or more tables failed to load under the continue policy.
    #[snafu(display("{} table(s) failed to load:\n{}", failures.len(), failures.join("\n")))]
    TablesFailed { failures: Vec<String> },

    /// Reconciliation error.
    #[snafu(display("{source}"))]
    Reconciliation { source: ReconciliationError },
}

impl From<ConfigError> for RunError {
    fn from(source: ConfigError) -> Self {
        RunError::Config { source }
    }
}

impl From<ProvisioningError> for RunError {
    fn from(source: ProvisioningError) -> Self {
        RunError::Provisioning { source }
    }
}

impl From<LoadError> for RunError {
    fn from(source: LoadError) -> Self {
        RunError::Load { source }
    }
}

impl From<ReconciliationError> for RunError {
    fn from(source: ReconciliationError) -> Self {
        RunError::Reconciliation { source }
    }
}

/// Errors raised while staging dataset files into the bucket.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagingError {
    /// The dataset directory does not exist.
    #[snafu(display("Dataset directory {path} does not exist"))]
    MissingRoot { path: String },

    /// Listing the dataset directory failed.
    #[snafu(display("Failed to read dataset directory {path}: {source}"))]
    ReadDataset {
        path: String,
        source: std::io::Error,
    },

    /// Opening the bucket failed.
    #[snafu(display("Failed to open bucket {url}: {source}"))]
    OpenBucket { url: String, source: StorageError },

    /// Removing existing objects under the prefix failed.
    #[snafu(display("Failed to clean prefix {prefix}: {source}"))]
    CleanPrefix {
        prefix: String,
        source: StorageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_does_not_exist_message() {
        let err = WarehouseError::does_not_exist("Table", "\"ANALYTICS\".\"RAW\".\"orders\"");
        let msg = err.to_string();
        assert!(msg.contains("002003"));
        assert!(msg.contains("does not exist or not authorized"));
        assert!(msg.contains("\"orders\""));
    }

    #[test]
    fn test_tables_failed_lists_every_table() {
        let err = RunError::TablesFailed {
            failures: vec!["orders: boom".to_string(), "events: bang".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 table(s) failed to load"));
        assert!(msg.contains("orders: boom"));
        assert!(msg.contains("events: bang"));
    }

    #[test]
    fn test_config_error_renders_transparently() {
        let err: RunError = ConfigError::MissingSetting {
            setting: "connection.password".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Missing required setting: connection.password"
        );
    }
}
