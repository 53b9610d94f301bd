//! URL parsing for storage backends.
//!
//! Turns a staging location (S3, GCS or a local directory) into a backend
//! configuration with an optional key prefix.

use object_store::path::Path;
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{GcsConfig, LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Local,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid storage URL pattern"))
        .collect()
}

// Checked in order; the first backend with a matching pattern wins.
static MATCHERS: LazyLock<Vec<(Backend, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            Backend::S3,
            compile(&[S3_PATH, S3_VIRTUAL, S3_ENDPOINT_URL, S3_URL]),
        ),
        (Backend::Gcs, compile(&[GCS_PATH, GCS_VIRTUAL, GCS_URL])),
        (Backend::Local, compile(&[FILE_URI, FILE_URL, FILE_PATH])),
    ]
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    ///
    /// Local paths are treated as directories; everything below the root of
    /// the URL becomes part of the store root rather than the key prefix.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, patterns) in MATCHERS.iter() {
            if let Some(matches) = patterns.iter().find_map(|r| r.captures(url)) {
                return match backend {
                    Backend::S3 => Ok(Self::parse_s3(&matches)),
                    Backend::Gcs => Ok(Self::parse_gcs(&matches)),
                    Backend::Local => Ok(Self::parse_local(&matches)),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn named(matches: &Captures, name: &str) -> String {
        matches
            .name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    fn key_of(matches: &Captures) -> Option<Path> {
        matches
            .name("key")
            .map(|m| m.as_str().trim_end_matches('/'))
            .filter(|key| !key.is_empty())
            .map(Path::from)
    }

    fn parse_s3(matches: &Captures) -> Self {
        let bucket = Self::named(matches, "bucket");

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: Self::key_of(matches),
        })
    }

    fn parse_gcs(matches: &Captures) -> Self {
        BackendConfig::Gcs(GcsConfig {
            bucket: Self::named(matches, "bucket"),
            key: Self::key_of(matches),
        })
    }

    fn parse_local(matches: &Captures) -> Self {
        let path = Self::named(matches, "path");
        let path = path.trim_end_matches('/');

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        BackendConfig::Local(LocalConfig { path, key: None })
    }

    /// The key prefix every relative path is qualified with.
    pub fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
        }
    }

    /// The bucket name, if the backend has one.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            BackendConfig::S3(s3) => Some(&s3.bucket),
            BackendConfig::Gcs(gcs) => Some(&gcs.bucket),
            BackendConfig::Local(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_url_parsing() {
        let config =
            BackendConfig::parse_url("s3://dataco-supply-chain-analytics/processed/").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "dataco-supply-chain-analytics");
                assert_eq!(s3.key, Some(Path::from("processed")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_bucket_without_key() {
        let config = BackendConfig::parse_url("s3://mybucket").unwrap();
        assert_eq!(config.key(), None);
        assert_eq!(config.bucket(), Some("mybucket"));
    }

    #[test]
    fn test_s3_path_style_url() {
        let config =
            BackendConfig::parse_url("https://s3.us-east-1.amazonaws.com/mybucket/path/to/data")
                .unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("path/to/data")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_endpoint_url() {
        let config =
            BackendConfig::parse_url("s3::http://localhost:9000/mybucket/processed").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.endpoint, Some("http://localhost:9000".to_string()));
                assert_eq!(s3.key, Some(Path::from("processed")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_gcs_url_parsing() {
        let config = BackendConfig::parse_url("gs://mybucket/path/to/data").unwrap();
        match config {
            BackendConfig::Gcs(gcs) => {
                assert_eq!(gcs.bucket, "mybucket");
                assert_eq!(gcs.key, Some(Path::from("path/to/data")));
            }
            _ => panic!("Expected Gcs config"),
        }
    }

    #[test]
    fn test_gcs_virtual_hosted_url() {
        let config =
            BackendConfig::parse_url("https://mybucket.storage.googleapis.com/path/to/data")
                .unwrap();
        assert!(matches!(config, BackendConfig::Gcs(_)));
        assert_eq!(config.key(), Some(&Path::from("path/to/data")));
    }

    #[test]
    fn test_local_path_is_directory() {
        let config = BackendConfig::parse_url("/var/lib/husky/stage/").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/var/lib/husky/stage");
                assert_eq!(local.key, None);
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_local_file_uri() {
        let config = BackendConfig::parse_url("file:///local/path/to/data").unwrap();
        match config {
            BackendConfig::Local(local) => assert_eq!(local.path, "/local/path/to/data"),
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_local_file_url() {
        let config = BackendConfig::parse_url("file:local/path").unwrap();
        match config {
            BackendConfig::Local(local) => assert_eq!(local.path, "/local/path"),
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_invalid_url() {
        let err = BackendConfig::parse_url("ftp://nowhere/data").unwrap_err();
        assert!(err.to_string().contains("ftp://nowhere/data"));
    }
}
