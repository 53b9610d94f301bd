//! Blob store client.
//!
//! Provides a unified interface over S3, GCS and the local filesystem for the
//! staging side of the pipeline: objects are put, listed, fetched and deleted
//! under a bucket plus key prefix.

mod gcs;
mod local;
mod s3;
mod url_parser;

pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, ReadLocalSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

/// Record the outcome and latency of one storage request.
fn record<T, E>(operation: StorageOperation, start: Instant, result: &Result<T, E>) {
    let status = if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Gcs(config) => Self::construct_gcs(config).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// The normalized URL this provider points at.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List objects under the configured prefix, recursively.
    /// Returns paths relative to the configured key prefix.
    pub async fn list(
        &self,
    ) -> Result<impl Stream<Item = Result<Path, object_store::Error>> + '_, StorageError> {
        self.list_with_prefix("").await
    }

    /// List objects under a prefix relative to the configured key prefix.
    ///
    /// Returns paths relative to the configured key prefix.
    pub async fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<impl Stream<Item = Result<Path, object_store::Error>> + '_, StorageError> {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let full_prefix: Option<Path> = match (self.config.key(), prefix.is_empty()) {
            (Some(key), _) => Some(key.parts().chain(Path::from(prefix).parts()).collect()),
            (None, true) => None,
            (None, false) => Some(Path::from(prefix)),
        };

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let list = self
            .object_store
            .list(full_prefix.as_ref())
            .map_ok(move |metadata| metadata.location.parts().skip(key_part_count).collect())
            .filter(|result: &Result<Path, object_store::Error>| {
                // Listing a prefix that does not exist yet is an empty listing
                ready(!matches!(result, Err(object_store::Error::NotFound { .. })))
            });

        Ok(list)
    }

    /// List and collect every object path under the configured prefix, sorted.
    pub async fn list_all(&self) -> Result<Vec<String>, StorageError> {
        let mut paths: Vec<String> = self
            .list()
            .await?
            .map_ok(|path| path.to_string())
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;
        paths.sort();
        Ok(paths)
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        record(StorageOperation::Get, start, &result);

        result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)
    }

    /// Put bytes to a path.
    pub async fn put(&self, path: impl Into<Path>, bytes: Bytes) -> Result<(), StorageError> {
        let path = path.into();
        self.put_payload(&path, PutPayload::from(bytes)).await
    }

    /// Upload a local file to a path.
    pub async fn put_file(
        &self,
        path: impl Into<Path>,
        local_path: &std::path::Path,
    ) -> Result<u64, StorageError> {
        let contents = tokio::fs::read(local_path).await.context(ReadLocalSnafu {
            path: local_path.display().to_string(),
        })?;
        let size = contents.len() as u64;
        self.put(path, Bytes::from(contents)).await?;
        Ok(size)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;
        record(StorageOperation::Put, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete an object at the given path.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;
        record(StorageOperation::Delete, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete every object under a prefix relative to the configured key prefix.
    ///
    /// Returns the number of objects removed. A prefix that does not exist is
    /// not an error.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let paths: Vec<Path> = self
            .list_with_prefix(prefix)
            .await?
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;

        for path in &paths {
            self.delete(path).await?;
        }

        debug!(
            "Deleted {} objects under {}/{}",
            paths.len(),
            self.canonical_url,
            prefix
        );
        Ok(paths.len())
    }

    /// Atomically write content to a path using temp file + rename.
    ///
    /// The target is never partially written:
    /// 1. Write to `{path}.tmp`
    /// 2. Rename `{path}.tmp` to `{path}`
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_path = Path::from(format!("{path}.tmp"));
        self.put_payload(&temp_path, PutPayload::from(Bytes::from(content)))
            .await?;
        self.rename(&temp_path, path).await
    }

    /// Server-side rename (move) operation.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(from);
        let to_qualified = self.qualify_path(to);
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&from_qualified, &to_qualified)
            .await;
        record(StorageOperation::Rename, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn local_storage(dir: &TempDir) -> StorageProvider {
        StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_returns_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("processed/clickstream");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("events.csv"), b"a,b\n").unwrap();
        std::fs::write(temp_dir.path().join("processed/orders.csv"), b"c,d\n").unwrap();

        let url = format!("{}/processed", temp_dir.path().display());
        let storage = StorageProvider::for_url_with_options(&url, HashMap::new())
            .await
            .unwrap();

        let listed = storage.list_all().await.unwrap();
        assert_eq!(listed, vec!["clickstream/events.csv", "orders.csv"]);

        for path in &listed {
            let content = storage.get(path.as_str()).await.unwrap();
            assert!(!content.is_empty());
        }
    }

    #[tokio::test]
    async fn test_qualify_path_prepends_key_prefix() {
        let storage = StorageProvider::for_url_with_options(
            "s3://supply-bucket/processed/daily/",
            HashMap::new(),
        )
        .await
        .unwrap();

        assert_eq!(storage.canonical_url(), "s3://supply-bucket/processed/daily");
        let binding = Path::from("orders.csv");
        let qualified = storage.qualify_path(&binding);
        assert_eq!(qualified.as_ref(), &Path::from("processed/daily/orders.csv"));
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        storage
            .put("raw/orders.csv", Bytes::from_static(b"1,widget\n"))
            .await
            .unwrap();

        let bytes = storage.get("raw/orders.csv").await.unwrap();
        assert_eq!(bytes.as_ref(), b"1,widget\n");
        assert!(temp_dir.path().join("raw/orders.csv").exists());
    }

    #[tokio::test]
    async fn test_put_file_uploads_local_contents() {
        let temp_dir = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let local = source_dir.path().join("orders.csv");
        std::fs::write(&local, b"id,name\n1,widget\n").unwrap();

        let storage = local_storage(&temp_dir).await;
        let size = storage.put_file("raw/orders.csv", &local).await.unwrap();

        assert_eq!(size, 17);
        let bytes = storage.get("raw/orders.csv").await.unwrap();
        assert_eq!(bytes.as_ref(), b"id,name\n1,widget\n");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let err = storage.get("missing.csv").await.unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_only_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        for key in ["raw/a.csv", "raw/nested/b.csv", "processed/c.csv"] {
            storage.put(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let removed = storage.delete_prefix("raw").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(storage.list_all().await.unwrap(), vec!["processed/c.csv"]);
    }

    #[tokio::test]
    async fn test_delete_prefix_missing_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let storage = local_storage(&temp_dir).await;

        let removed = storage.delete_prefix("never-written").await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_atomic_write_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("catalog.json"), b"old content").unwrap();
        let storage = local_storage(&temp_dir).await;

        let path = Path::from("catalog.json");
        storage
            .atomic_write(&path, b"new content".to_vec())
            .await
            .unwrap();

        let read_content = storage.get("catalog.json").await.unwrap();
        assert_eq!(read_content.as_ref(), b"new content");
        assert!(!temp_dir.path().join("catalog.json.tmp").exists());
    }
}
