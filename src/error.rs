//! Error types for the xlsform-gateway library.
//!
//! Three error types follow the three layers a conversion passes through:
//!
//! * [`StorageError`] — the Storage Gateway could not create, write or remove
//!   something under the upload directory.
//!
//! * [`ConverterError`] — the Conversion Gateway failed: the external grammar
//!   rejected the spreadsheet, or the converter process itself misbehaved.
//!
//! * [`XformError`] — **Fatal**, returned by [`crate::ConversionService`].
//!   Every failure of a request collapses into this type, and over HTTP every
//!   variant is rendered the same way (see [`XformError::detail`]).

use std::path::PathBuf;
use thiserror::Error;

/// Prefix shared by every user-visible conversion failure.
pub const FAILURE_PREFIX: &str = "Failed to convert XLS to XForm";

/// Failures of the Storage Gateway.
///
/// Absence of a file is never one of these: removal is idempotent.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the Conversion Gateway.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The converter executable could not be launched at all.
    #[error("Converter '{program}' could not be started: {source}\nIs pyxform installed? Try: pip install pyxform")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The spreadsheet was rejected by the form grammar. `message` is the
    /// converter's own diagnostic, passed through verbatim.
    #[error("{message}")]
    Rejected { message: String },

    /// The converter exited unsuccessfully without a structured report.
    #[error("Converter exited with {status}: {stderr}")]
    Crashed { status: String, stderr: String },

    #[error("Converter timed out after {after:?}")]
    Timeout { after: std::time::Duration },

    /// The converter reported success but the output file is absent or empty.
    #[error("Converter produced no output at '{path}'")]
    MissingOutput { path: PathBuf },

    #[error("Failed to create output directory: {0}")]
    OutputDir(#[source] std::io::Error),
}

/// All fatal errors returned by the xlsform-gateway library.
#[derive(Debug, Error)]
pub enum XformError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// Nothing usable is left of the client filename after sanitisation.
    #[error("Invalid upload filename {name:?}: expected a plain file name such as 'survey.xlsx'")]
    InvalidFilename { name: String },

    /// The upload carried no bytes.
    #[error("Uploaded file {name:?} is empty")]
    EmptyUpload { name: String },

    /// Staging the upload (or preparing the upload directory) failed.
    #[error(transparent)]
    Staging(#[from] StorageError),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The Conversion Gateway failed; `message` preserves its diagnostic.
    #[error("Failed to convert XLS to XForm: {message}")]
    ConversionFailed { message: String },

    // ── Local file errors (CLI) ───────────────────────────────────────────
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other failure reading a local input file.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output XForm file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl XformError {
    /// The uniform, user-facing message for this failure.
    ///
    /// Always starts with [`FAILURE_PREFIX`], whatever the variant.
    pub fn detail(&self) -> String {
        match self {
            XformError::ConversionFailed { .. } => self.to_string(),
            other => format!("{FAILURE_PREFIX}: {other}"),
        }
    }
}

impl From<ConverterError> for XformError {
    fn from(err: ConverterError) -> Self {
        XformError::ConversionFailed {
            message: err.to_string(),
        }
    }
}
