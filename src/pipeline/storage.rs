//! Storage Gateway: the only code that writes to or deletes from the upload
//! directory.
//!
//! ## Why write-then-rename?
//!
//! A converter that opens a half-written spreadsheet fails with a confusing
//! grammar error. `save` writes to a sibling `*.part` file, syncs it, and
//! renames it into place, so the destination path either does not exist or
//! holds the complete upload.

use crate::error::StorageError;
use crate::pipeline::upload::Upload;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Persists uploads and removes them again.
#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Create `dir` and any missing parents. Succeeds if it already exists.
    async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError>;

    /// Write the full upload to `destination`, creating or truncating it.
    async fn save(&self, upload: &Upload, destination: &Path) -> Result<(), StorageError>;

    /// Delete the file or directory at `path`. A missing path is not an error.
    async fn remove(&self, path: &Path) -> Result<(), StorageError>;
}

/// [`UploadStore`] backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }
}

/// Suffix of the in-progress file `save` writes before renaming.
pub const PART_SUFFIX: &str = ".part";

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}

#[async_trait]
impl UploadStore for LocalStore {
    async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })
    }

    async fn save(&self, upload: &Upload, destination: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let tmp_path = part_path(destination);
        let write_err = |source| StorageError::Write {
            path: destination.to_path_buf(),
            source,
        };

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(upload.content()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, destination).await
        }
        .await;

        if let Err(e) = written {
            // The destination was never touched; only the part file can be left.
            let _ = fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!(
            path = %destination.display(),
            size_bytes = upload.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload staged"
        );
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), StorageError> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Nothing to remove at {}", path.display());
                return Ok(());
            }
            Err(source) => {
                return Err(StorageError::Remove {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match removed {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            // Lost a race with another remover; the outcome is the same.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
