//! Conversion orchestrator: stage, convert, always clean up.
//!
//! [`ConversionService`] is the one object the HTTP layer and the CLI share.
//! It holds no per-request state; everything a request touches on disk lives
//! under its own `<upload_dir>/<uuid>/` directory, owned by a
//! [`StagedInput`] guard for the duration of the request.
//!
//! ```text
//! Idle ──▶ Staged ──▶ Converting ──▶ Succeeded ─┐
//!                                 └─▶ Failed ────┴─▶ Cleaned
//! ```

use crate::config::ServiceConfig;
use crate::error::XformError;
use crate::pipeline::stage::StagedInput;
use crate::pipeline::storage::{LocalStore, UploadStore};
use crate::pipeline::upload::{sanitize_filename, Upload};
use crate::pipeline::xform::{ConvertedForm, PyxformCli, XformConverter};
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Turns uploaded XLSForms into XForms, one request at a time or many
/// concurrently.
pub struct ConversionService {
    upload_dir: PathBuf,
    store: Arc<dyn UploadStore>,
    converter: Arc<dyn XformConverter>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("upload_dir", &self.upload_dir)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl ConversionService {
    /// Build a service from explicit gateways.
    ///
    /// The upload directory is created here, so a misconfigured path fails
    /// at startup rather than on the first request.
    pub async fn new(
        config: &ServiceConfig,
        store: Arc<dyn UploadStore>,
        converter: Arc<dyn XformConverter>,
    ) -> Result<Self, XformError> {
        let service = Self {
            upload_dir: config.upload_dir.clone(),
            store,
            converter,
            progress_callback: config.progress_callback.clone(),
        };
        service.ensure_upload_directory().await?;
        Ok(service)
    }

    /// Build a service backed by the local filesystem and pyxform's
    /// `xls2xform`, as configured.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self, XformError> {
        Self::new(
            config,
            Arc::new(LocalStore::new()),
            Arc::new(PyxformCli::from_config(config)),
        )
        .await
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Make sure the upload root exists. Safe to call any number of times.
    pub async fn ensure_upload_directory(&self) -> Result<(), XformError> {
        self.store.ensure_dir(&self.upload_dir).await?;
        debug!("Upload directory ready: {}", self.upload_dir.display());
        Ok(())
    }

    /// Stage `upload`, convert it, and remove the staged copy.
    ///
    /// The staged input is removed whatever the outcome; a failure to remove
    /// it is logged and does not change the result. On success the returned
    /// [`ConvertedForm`] owns the output file and deletes it when dropped.
    ///
    /// # Errors
    /// * [`XformError::InvalidFilename`] — nothing usable left of the name
    /// * [`XformError::EmptyUpload`] — no bytes to convert
    /// * [`XformError::Staging`] — the upload could not be written
    /// * [`XformError::ConversionFailed`] — the converter rejected the file
    ///   or failed to run; carries its diagnostic
    pub async fn handle_upload_and_convert(
        &self,
        upload: Upload,
    ) -> Result<ConvertedForm, XformError> {
        let start = Instant::now();
        let file_name = sanitize_filename(upload.file_name())?;
        if upload.is_empty() {
            return Err(XformError::EmptyUpload {
                name: upload.file_name().to_string(),
            });
        }

        // The request directory is created with all missing parents, so an
        // upload root deleted after startup comes back here.
        let request_dir = self.upload_dir.join(Uuid::new_v4().to_string());
        let staged =
            StagedInput::stage(Arc::clone(&self.store), request_dir, &file_name, &upload).await?;
        let staged_path = staged.path().to_path_buf();

        if let Some(ref cb) = self.progress_callback {
            cb.on_upload_staged(&staged_path, upload.len());
            cb.on_conversion_start(&staged_path);
        }

        let result = self.converter.convert(&staged_path).await;

        match &result {
            Ok(form) => {
                if let Some(ref cb) = self.progress_callback {
                    cb.on_conversion_complete(form.path());
                }
            }
            Err(e) => {
                warn!(file = %file_name, "Conversion failed: {}", e);
                if let Some(ref cb) = self.progress_callback {
                    cb.on_conversion_error(&e.to_string());
                }
            }
        }

        staged.release().await;
        if let Some(ref cb) = self.progress_callback {
            cb.on_cleanup_complete(&staged_path);
        }

        let form = result?;
        info!(
            file = %file_name,
            size_bytes = upload.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request converted"
        );
        Ok(form)
    }

    /// Convert `upload` and write the XForm to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) so `output_path` is never left
    /// half-written.
    pub async fn convert_to_file(
        &self,
        upload: Upload,
        output_path: impl AsRef<Path>,
    ) -> Result<PathBuf, XformError> {
        let form = self.handle_upload_and_convert(upload).await?;
        let path = output_path.as_ref();
        let write_err = |e| XformError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let tmp_path = path.with_extension("xml.tmp");
        if let Err(e) = tokio::fs::copy(form.path(), &tmp_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!("Wrote XForm to {}", path.display());
        Ok(path.to_path_buf())
    }
}
