//! Pipeline stages for XLSForm-to-XForm conversion.
//!
//! Each submodule owns one concern, so the filesystem and the external
//! converter can each be swapped (or stubbed in tests) without touching the
//! orchestrator in [`crate::convert`].
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ stage ──▶ xform ──▶ (release)
//! (bytes)    (disk)    (pyxform)  (cleanup)
//! ```
//!
//! 1. [`upload`]  — the client's bytes and a sanitised, single-component name
//! 2. [`storage`] — the only code that writes to or deletes from the upload
//!    directory
//! 3. [`stage`]   — a scoped guard that owns one request directory and removes
//!    it on release, or on drop if the request is cancelled
//! 4. [`xform`]   — run the external converter; output lands in a private
//!    temp dir that lives as long as the [`xform::ConvertedForm`]

pub mod stage;
pub mod storage;
pub mod upload;
pub mod xform;
