//! Configuration loading shared by the husky crates.
//!
//! Configuration is YAML with environment variable interpolation applied to
//! the raw text before parsing, so any scalar can be sourced from the
//! environment.

mod vars;

pub use vars::{InterpolationResult, interpolate, interpolate_with};

use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ConfigError, EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu};

/// Interpolate environment variables in `contents` and deserialize the result.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let result = interpolate(contents);
    ensure!(
        result.is_ok(),
        EnvInterpolationSnafu {
            message: result.errors.join("\n"),
        }
    );
    serde_yaml::from_str(&result.text).context(YamlParseSnafu)
}

/// Read a YAML file, interpolate it and deserialize the result.
pub fn load_yaml_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    parse_yaml(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_yaml_without_variables() {
        let sample: Sample = parse_yaml("name: orders\ncount: 3\n").unwrap();
        assert_eq!(sample.name, "orders");
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn test_parse_yaml_reports_interpolation_errors() {
        let err = parse_yaml::<Sample>("name: ${HUSKY_TEST_SURELY_UNSET_VAR}\n").unwrap_err();
        assert!(matches!(err, ConfigError::EnvInterpolation { .. }));
        assert!(err.to_string().contains("HUSKY_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_load_yaml_file_missing_path() {
        let err = load_yaml_file::<Sample>("/nonexistent/husky.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.to_string().contains("/nonexistent/husky.yaml"));
    }

    #[test]
    fn test_load_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("husky.yaml");
        std::fs::write(&path, "name: clickstream\n").unwrap();

        let sample: Sample = load_yaml_file(&path).unwrap();
        assert_eq!(sample.name, "clickstream");
        assert_eq!(sample.count, 0);
    }
}
