//! Progress-callback trait for per-request conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to observe each
//! request walk through its stages:
//!
//! ```text
//! Idle ──▶ Staged ──▶ Converting ──▶ Succeeded ─┐
//!                                 └─▶ Failed ────┴─▶ Cleaned
//! ```
//!
//! The CLI drives its spinner from these events; tests use them to check
//! that cleanup always runs last.
//!
//! # Example
//!
//! ```rust
//! use xlsform_gateway::{ConversionProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for FailureCounter {
//!     fn on_conversion_error(&self, message: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("conversion failed: {message}");
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failures: AtomicUsize::new(0) });
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::ConversionService`] as a request changes stage.
///
/// Implementations must be `Send + Sync`: the HTTP server runs many requests
/// concurrently and they all share one callback. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// The upload has been written to its staging path.
    ///
    /// # Arguments
    /// * `staged` — path of the staged input file
    /// * `bytes`  — size of the upload
    fn on_upload_staged(&self, staged: &Path, bytes: usize) {
        let _ = (staged, bytes);
    }

    /// The converter is about to be invoked on `source`.
    fn on_conversion_start(&self, source: &Path) {
        let _ = source;
    }

    /// The converter produced `output`.
    fn on_conversion_complete(&self, output: &Path) {
        let _ = output;
    }

    /// The converter failed.
    ///
    /// # Arguments
    /// * `message` — the converter's diagnostic
    fn on_conversion_error(&self, message: &str) {
        let _ = message;
    }

    /// The staged input at `staged` has been removed. Fired after either
    /// outcome of the conversion.
    fn on_cleanup_complete(&self, staged: &Path) {
        let _ = staged;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
