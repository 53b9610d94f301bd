//! Configuration for the husky loader.
//!
//! Configuration is a YAML document, environment-interpolated before parsing.
//! When no file is given the embedded supply-chain configuration is used,
//! which reads its credentials and overrides from `SNOWFLAKE_*` and `S3_*`
//! environment variables.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use husky_core::config::{InterpolationResult, interpolate};

use crate::error::ConfigError;
use crate::plan::LoadPlan;

/// Embedded configuration reproducing the supply-chain load.
pub const DEFAULT_CONFIG: &str = include_str!("../config/supply_chain.yaml");

fn default_compute_warehouse() -> String {
    "COMPUTE_WH".to_string()
}

fn default_statement_timeout_secs() -> u64 {
    3600
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stage_name() -> String {
    "husky_stage".to_string()
}

fn default_field_delimiter() -> char {
    ','
}

fn default_quote() -> Option<char> {
    Some('"')
}

fn default_null_if() -> Vec<String> {
    vec!["\\N".to_string()]
}

fn default_dataset_prefix() -> String {
    "raw".to_string()
}

fn default_true() -> bool {
    true
}

/// How a Snowflake bearer credential should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    #[default]
    ProgrammaticAccessToken,
    Oauth,
    KeypairJwt,
}

impl TokenType {
    pub fn as_header(&self) -> &'static str {
        match self {
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
            TokenType::Oauth => "OAUTH",
            TokenType::KeypairJwt => "KEYPAIR_JWT",
        }
    }
}

/// Snowflake account settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    /// Account identifier, e.g. `myorg-myaccount`.
    pub account: String,
    pub user: String,
    /// Bearer credential (programmatic access token, OAuth token or JWT).
    pub password: String,
    /// Compute warehouse the statements run on.
    #[serde(default = "default_compute_warehouse")]
    pub warehouse: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub token_type: TokenType,
    /// Override for the API host, e.g. for private link endpoints.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
    /// Delay between status polls of a running statement.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("token_type", &self.token_type)
            .field("host", &self.host)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

/// Settings for the embedded warehouse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalWarehouseConfig {
    /// Storage URL the catalog snapshot is persisted under. In-memory when unset.
    #[serde(default)]
    pub state_url: Option<String>,
    /// Options passed to the blob store client when reading stages.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Which warehouse to connect to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Snowflake(SnowflakeConfig),
    Local(LocalWarehouseConfig),
}

/// Target database and schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub database: String,
    pub schema: String,
}

/// External stage over the bucket prefix holding the files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_stage_name")]
    pub name: String,
    /// Bucket name, or a full storage URL (`s3://…`, `gs://…`, `file://…`, `/dir`).
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub storage_integration: Option<String>,
    /// Options for the blob store client (staging and local loads).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl StageConfig {
    /// Storage URL of the bucket root.
    pub fn bucket_url(&self) -> String {
        let bucket = self.bucket.trim_end_matches('/');
        if bucket.contains("://") || bucket.starts_with('/') {
            bucket.to_string()
        } else {
            format!("s3://{bucket}")
        }
    }

    /// Storage URL of the stage root, always ending in `/`.
    pub fn url(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}/", self.bucket_url())
        } else {
            format!("{}/{prefix}/", self.bucket_url())
        }
    }

    /// Storage integration name, ignoring blank values.
    pub fn integration(&self) -> Option<&str> {
        self.storage_integration
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// A delimited-text file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFormatConfig {
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: char,
    #[serde(default = "default_quote")]
    pub quote: Option<char>,
    #[serde(default)]
    pub skip_header: u32,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default = "default_null_if")]
    pub null_if: Vec<String>,
}

/// A destination column as written in the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// A destination table and its source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// File path relative to the stage root.
    pub file: String,
    /// Name of a format declared under `file_formats`.
    pub file_format: String,
    /// Ordered columns; source field `i` loads into column `i`.
    pub columns: Vec<ColumnConfig>,
}

/// What to do when one table fails to load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFailurePolicy {
    /// Stop at the first failing table.
    #[default]
    Abort,
    /// Keep loading the remaining tables; the run still fails.
    Continue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub on_table_failure: TableFailurePolicy,
}

/// Files uploaded by `husky stage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Local directory holding the dataset. Overridden by `--from`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Key prefix under the bucket the files are uploaded to.
    #[serde(default = "default_dataset_prefix")]
    pub prefix: String,
    /// Files to upload, relative to `path`. Everything under `path` when empty.
    #[serde(default)]
    pub files: Vec<String>,
    /// Remove existing objects under the prefix before uploading.
    #[serde(default = "default_true")]
    pub clean_existing: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            prefix: default_dataset_prefix(),
            files: Vec::new(),
            clean_existing: true,
        }
    }
}

/// Main configuration for husky.
///
/// # Example
///
/// ```yaml
/// connection:
///   type: snowflake
///   account: ${SNOWFLAKE_ACCOUNT}
///   user: ${SNOWFLAKE_USER}
///   password: ${SNOWFLAKE_PASSWORD}
///
/// namespace:
///   database: ANALYTICS
///   schema: RAW
///
/// stage:
///   bucket: my-bucket
///   prefix: processed/
///   storage_integration: my_s3_integration
///
/// file_formats:
///   csv_format:
///     skip_header: 1
///     timestamp_format: MM/DD/YYYY HH24:MI
///
/// tables:
///   orders:
///     file: orders/orders.csv
///     file_format: csv_format
///     columns:
///       - { name: id, type: INT }
///       - { name: placed_at, type: TIMESTAMP_NTZ }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub namespace: NamespaceConfig,
    pub stage: StageConfig,
    #[serde(default)]
    pub file_formats: IndexMap<String, FileFormatConfig>,
    #[serde(default)]
    pub tables: IndexMap<String, TableConfig>,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        husky_core::config::load_yaml_file(path)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        husky_core::config::parse_yaml(contents)
    }

    /// The embedded supply-chain configuration, interpolated from the environment.
    pub fn embedded_default() -> Result<Self, ConfigError> {
        Self::parse(DEFAULT_CONFIG)
    }

    /// Validate every setting, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        LoadPlan::from_config(self).map(|_| ())
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use husky_core::config::interpolate_with;

    const MINIMAL: &str = r#"
connection:
  type: local
namespace:
  database: ANALYTICS
  schema: RAW
stage:
  bucket: /tmp/husky-bucket
  prefix: processed/
file_formats:
  csv:
    skip_header: 1
tables:
  orders:
    file: orders.csv
    file_format: csv
    columns:
      - { name: id, type: INT }
"#;

    fn default_config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let result = interpolate_with(DEFAULT_CONFIG, |name| vars.get(name).cloned());
        if !result.is_ok() {
            return Err(ConfigError::EnvInterpolation {
                message: result.errors.join("\n"),
            });
        }
        serde_yaml::from_str(&result.text).map_err(|source| ConfigError::YamlParse { source })
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert!(matches!(config.connection, ConnectionConfig::Local(_)));
        assert_eq!(config.stage.name, "husky_stage");
        assert_eq!(config.stage.url(), "/tmp/husky-bucket/processed/");
        assert_eq!(
            config.error_handling.on_table_failure,
            TableFailurePolicy::Abort
        );

        let format = &config.file_formats["csv"];
        assert_eq!(format.field_delimiter, ',');
        assert_eq!(format.quote, Some('"'));
        assert_eq!(format.null_if, vec!["\\N".to_string()]);
        assert_eq!(config.dataset.prefix, "raw");
        assert!(config.dataset.clean_existing);
        config.validate().unwrap();
    }

    #[test]
    fn test_stage_url_forms() {
        let mut stage = StageConfig {
            name: default_stage_name(),
            bucket: "dataco-supply-chain-analytics".to_string(),
            prefix: "processed/".to_string(),
            storage_integration: Some("  ".to_string()),
            storage_options: HashMap::new(),
        };
        assert_eq!(stage.url(), "s3://dataco-supply-chain-analytics/processed/");
        assert_eq!(stage.integration(), None);

        stage.bucket = "gs://other-bucket/".to_string();
        stage.prefix = String::new();
        assert_eq!(stage.url(), "gs://other-bucket/");
    }

    #[test]
    fn test_embedded_default_matches_supply_chain_load() {
        let config = default_config_with(&[
            ("SNOWFLAKE_ACCOUNT", "xy12345"),
            ("SNOWFLAKE_USER", "loader"),
            ("SNOWFLAKE_PASSWORD", "token"),
        ])
        .unwrap();

        match &config.connection {
            ConnectionConfig::Snowflake(snowflake) => {
                assert_eq!(snowflake.account, "xy12345");
                assert_eq!(snowflake.warehouse, "COMPUTE_WH");
                assert_eq!(snowflake.role, None);
            }
            other => panic!("unexpected connection {other:?}"),
        }
        assert_eq!(config.namespace.database, "SUPPLYCHAINDB");
        assert_eq!(config.namespace.schema, "RAWDATA");
        assert_eq!(
            config.stage.url(),
            "s3://dataco-supply-chain-analytics/processed/"
        );
        assert_eq!(
            config.stage.integration(),
            Some("supplyChainS3Integration")
        );

        let tables: Vec<&str> = config.tables.keys().map(String::as_str).collect();
        assert_eq!(tables, vec!["dataCoSupplyChainOrders", "clickstreamEvents"]);
        assert_eq!(config.tables["dataCoSupplyChainOrders"].columns.len(), 58);
        assert_eq!(config.tables["clickstreamEvents"].columns.len(), 20);
        assert_eq!(
            config.file_formats["csv_format_clickstream"]
                .date_format
                .as_deref(),
            Some("YYYY-MM-DD")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_embedded_default_requires_credentials() {
        let err = default_config_with(&[("SNOWFLAKE_ACCOUNT", "xy12345")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SNOWFLAKE_USER"));
        assert!(msg.contains("SNOWFLAKE_PASSWORD"));
    }

    #[test]
    fn test_embedded_default_honours_overrides() {
        let config = default_config_with(&[
            ("SNOWFLAKE_ACCOUNT", "xy12345"),
            ("SNOWFLAKE_USER", "loader"),
            ("SNOWFLAKE_PASSWORD", "token"),
            ("SNOWFLAKE_DATABASE", "ANALYTICS"),
            ("S3_BUCKET_NAME", "other-bucket"),
            ("S3_PROCESSED_PREFIX", "clean/"),
        ])
        .unwrap();
        assert_eq!(config.namespace.database, "ANALYTICS");
        assert_eq!(config.stage.url(), "s3://other-bucket/clean/");
    }

    #[test]
    fn test_password_is_redacted() {
        let config = default_config_with(&[
            ("SNOWFLAKE_ACCOUNT", "xy12345"),
            ("SNOWFLAKE_USER", "loader"),
            ("SNOWFLAKE_PASSWORD", "super-secret-token"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_policy_and_token_type_parsing() {
        let handling: ErrorHandlingConfig =
            serde_yaml::from_str("on_table_failure: continue").unwrap();
        assert_eq!(handling.on_table_failure, TableFailurePolicy::Continue);

        let token: TokenType = serde_yaml::from_str("OAUTH").unwrap();
        assert_eq!(token.as_header(), "OAUTH");
        assert!(serde_yaml::from_str::<TokenType>("PASSWORD").is_err());
    }
}
