//! # xlsform-gateway
//!
//! Convert XLSForm spreadsheets to XForm XML over HTTP.
//!
//! ## Why this crate?
//!
//! XLSForm is how most field-survey teams author forms; data-collection
//! clients (ODK Collect, Enketo, KoboToolbox) consume XForms. The grammar
//! that maps one onto the other lives in pyxform. This crate puts a small,
//! concurrent HTTP front on that converter: accept an upload, stage it,
//! convert it, hand back the XML, and leave nothing behind on disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /xls/to/xform (multipart "file")
//!  │
//!  ├─ 1. Upload   sanitise the client filename
//!  ├─ 2. Stage    write to uploads/<uuid>/<name> (write + rename)
//!  ├─ 3. Convert  xls2xform --json <staged> <tmp>/<stem>.xml
//!  ├─ 4. Release  remove the staged input, whatever happened in 3
//!  └─ 5. Respond  stream <stem>.xml as an attachment, then drop the temp dir
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xlsform_gateway::{server, ConversionService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().upload_dir("uploads").build()?;
//!     let service = Arc::new(ConversionService::from_config(&config).await?);
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//!     let app = server::router(service, config.max_upload_bytes);
//!     server::serve(listener, app, server::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `xlsform-gateway` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! xlsform-gateway = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use convert::ConversionService;
pub use error::{ConverterError, StorageError, XformError, FAILURE_PREFIX};
pub use pipeline::storage::{LocalStore, UploadStore};
pub use pipeline::upload::Upload;
pub use pipeline::xform::{prepare_output, ConvertedForm, PyxformCli, XformConverter};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
