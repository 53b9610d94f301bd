//! Upload of dataset files into the bucket.

use object_store::path::Path;
use snafu::prelude::*;
use tracing::{info, warn};

use super::DatasetSource;
use crate::error::{CleanPrefixSnafu, StagingError};
use husky_core::storage::StorageProvider;

fn key(prefix: &str, relative_path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative_path.to_string()
    } else {
        format!("{prefix}/{relative_path}")
    }
}

/// Upload every resolved file to `<prefix>/<relative path>`.
///
/// When `clean_existing` is set, everything under the prefix is removed
/// first. A file that fails to upload is logged and skipped. Returns the keys
/// written.
pub async fn stage_dataset(
    source: &dyn DatasetSource,
    storage: &StorageProvider,
    prefix: &str,
    clean_existing: bool,
) -> Result<Vec<String>, StagingError> {
    let files = source.resolve().await?;

    if clean_existing {
        let prefix = prefix.trim_matches('/');
        let removed = storage
            .delete_prefix(prefix)
            .await
            .context(CleanPrefixSnafu { prefix })?;
        info!(
            "Removed {removed} existing object(s) under {}/{prefix}",
            storage.canonical_url()
        );
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let key = key(prefix, &file.relative_path);
        match storage.put_file(Path::from(key.as_str()), &file.local_path).await {
            Ok(size) => {
                info!(key = %key, bytes = size, "Uploaded {}", file.local_path.display());
                uploaded.push(key);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to upload {}, skipping", file.local_path.display());
            }
        }
    }

    info!(
        "Staged {} file(s) into {}/{}",
        uploaded.len(),
        storage.canonical_url(),
        prefix.trim_matches('/')
    );
    Ok(uploaded)
}
