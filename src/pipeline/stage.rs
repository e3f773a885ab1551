//! Scoped staging of an upload.
//!
//! A [`StagedInput`] owns one request directory under the upload root and the
//! staged file inside it. The normal exit paths call [`StagedInput::release`];
//! if the guard is dropped without being released (the converter panicked, or
//! the request future was cancelled mid-conversion) `Drop` schedules the same
//! removal on the current Tokio runtime. Either way nothing outlives the
//! request.

use crate::error::StorageError;
use crate::pipeline::storage::UploadStore;
use crate::pipeline::upload::Upload;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// An upload written to `<request_dir>/<file_name>`, removed on release or drop.
pub struct StagedInput {
    store: Arc<dyn UploadStore>,
    request_dir: PathBuf,
    path: PathBuf,
    released: bool,
}

impl StagedInput {
    /// Create `request_dir` and write `upload` into it as `file_name`.
    ///
    /// On failure the request directory is removed again before returning.
    pub async fn stage(
        store: Arc<dyn UploadStore>,
        request_dir: PathBuf,
        file_name: &str,
        upload: &Upload,
    ) -> Result<Self, StorageError> {
        let path = request_dir.join(file_name);
        store.ensure_dir(&request_dir).await?;

        // From here on the guard owns the directory.
        let mut staged = Self {
            store,
            request_dir,
            path,
            released: false,
        };
        if let Err(e) = staged.store.save(upload, &staged.path).await {
            staged.cleanup().await;
            return Err(e);
        }
        Ok(staged)
    }

    /// Path of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file and its request directory.
    ///
    /// Removal failures are logged, not returned: the caller's outcome
    /// (converted or not) is what the request reports.
    pub async fn release(mut self) {
        self.cleanup().await;
    }

    async fn cleanup(&mut self) {
        self.released = true;
        for target in [&self.path, &self.request_dir] {
            if let Err(e) = self.store.remove(target).await {
                warn!("Cleanup of staged upload failed: {}", e);
            }
        }
        debug!("Released staged upload {}", self.path.display());
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let path = std::mem::take(&mut self.path);
        let request_dir = std::mem::take(&mut self.request_dir);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    "Staged upload {} dropped before release; scheduling cleanup",
                    path.display()
                );
                handle.spawn(async move {
                    for target in [&path, &request_dir] {
                        if let Err(e) = store.remove(target).await {
                            warn!("Deferred cleanup of staged upload failed: {}", e);
                        }
                    }
                });
            }
            Err(_) => warn!(
                "Staged upload {} dropped outside a Tokio runtime; it was not removed",
                path.display()
            ),
        }
    }
}
