//! Dataset files to stage.
//!
//! A [`DatasetSource`] resolves a dataset to local files. The only source
//! that ships is a local directory; downloading from an external registry is
//! left to whatever fills that directory.

mod upload;

pub use upload::stage_dataset;

use async_trait::async_trait;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ReadDatasetSnafu, StagingError};

/// A local file and the key it is staged under, relative to the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub local_path: PathBuf,
    /// `/`-separated path relative to the dataset root.
    pub relative_path: String,
}

/// Resolves a dataset to local files.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn resolve(&self) -> Result<Vec<DatasetFile>, StagingError>;
}

/// Files under a local directory.
#[derive(Debug, Clone)]
pub struct LocalDirectorySource {
    root: PathBuf,
    files: Vec<String>,
}

impl LocalDirectorySource {
    /// Every file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
        }
    }

    /// Only the listed files, relative to the root. Missing ones are skipped.
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    async fn walk(&self) -> Result<Vec<DatasetFile>, StagingError> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.context(ReadDatasetSnafu {
                path: dir.display().to_string(),
            })?;
            while let Some(entry) = entries.next_entry().await.context(ReadDatasetSnafu {
                path: dir.display().to_string(),
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.context(ReadDatasetSnafu {
                    path: path.display().to_string(),
                })?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Some(relative_path) = relative(&self.root, &path) {
                        files.push(DatasetFile {
                            local_path: path,
                            relative_path,
                        });
                    }
                }
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    async fn listed(&self) -> Vec<DatasetFile> {
        let mut files = Vec::with_capacity(self.files.len());
        for name in &self.files {
            let relative_path = name.trim_start_matches('/').to_string();
            let local_path = self.root.join(&relative_path);
            match tokio::fs::metadata(&local_path).await {
                Ok(metadata) if metadata.is_file() => files.push(DatasetFile {
                    local_path,
                    relative_path,
                }),
                _ => warn!(file = %local_path.display(), "Dataset file not found, skipping"),
            }
        }
        files
    }
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let parts: Vec<String> = path
        .strip_prefix(root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[async_trait]
impl DatasetSource for LocalDirectorySource {
    async fn resolve(&self) -> Result<Vec<DatasetFile>, StagingError> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(StagingError::MissingRoot {
                path: self.root.display().to_string(),
            });
        }

        let files = if self.files.is_empty() {
            self.walk().await?
        } else {
            self.listed().await
        };
        debug!(root = %self.root.display(), count = files.len(), "Resolved dataset files");
        Ok(files)
    }
}
