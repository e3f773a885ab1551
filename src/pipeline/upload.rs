//! Upload payloads: the bytes a client sent plus the name it sent them under.
//!
//! ## Why sanitise the client filename?
//!
//! The staging path is built by joining the upload directory with the name
//! the client chose. Taken verbatim, `../../etc/cron.d/x` or an absolute path
//! would escape the upload directory. [`sanitize_filename`] keeps only the
//! last path component and a conservative character set, so the joined path
//! always stays one level below its request directory.

use crate::error::XformError;
use crate::pipeline::storage::PART_SUFFIX;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Longest file name we stage, in bytes. Leaves room for the `.part` file
/// written next to it within the usual 255-byte name limit.
const MAX_FILENAME_BYTES: usize = 255 - PART_SUFFIX.len();

/// Longer "extensions" are treated as part of the stem when truncating.
const MAX_EXTENSION_BYTES: usize = 16;

/// Stem used when a file name has nothing before its first dot.
const FALLBACK_STEM: &str = "form";

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._ -]").expect("valid regex"));

/// One uploaded file, held in memory until it is staged.
#[derive(Debug, Clone)]
pub struct Upload {
    file_name: String,
    content: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Read a local file into an upload named after the file.
    ///
    /// Used by the CLI, which feeds local spreadsheets through the same
    /// staging path as HTTP uploads.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, XformError> {
        let path = path.as_ref();
        let content = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(XformError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(XformError::PermissionDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(XformError::ReadFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| XformError::FileNotFound {
                path: path.to_path_buf(),
            })?;

        debug!("Read local upload: {} ({} bytes)", path.display(), content.len());
        Ok(Self::new(file_name, content))
    }

    /// The name the client supplied, unsanitised.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Reduce a client-supplied file name to a safe, single path component.
///
/// Directory parts (either separator) are dropped, characters outside
/// `[A-Za-z0-9._ -]` become `_`, and leading dots are stripped so the result
/// is never `.`, `..` or a hidden file. Over-long names lose the end of
/// their stem; the extension is kept.
pub fn sanitize_filename(raw: &str) -> Result<String, XformError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = UNSAFE_CHARS.replace_all(base, "_");
    let cleaned = truncate_keeping_extension(cleaned.trim().trim_start_matches('.'));

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        return Err(XformError::InvalidFilename {
            name: raw.to_string(),
        });
    }
    Ok(cleaned)
}

/// Cap `name` at [`MAX_FILENAME_BYTES`]. `name` must be ASCII, which
/// [`UNSAFE_CHARS`] guarantees, so every byte index is a char boundary.
fn truncate_keeping_extension(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }
    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => {
            let ext = &name[dot..];
            format!("{}{}", &name[..MAX_FILENAME_BYTES - ext.len()], ext)
        }
        _ => name[..MAX_FILENAME_BYTES].to_string(),
    }
}

/// The form name for a source file: its base name up to the first `.`.
///
/// `survey.xlsx` → `survey`, `household.v2.xls` → `household`.
pub fn form_stem(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match base.split('.').next() {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => FALLBACK_STEM.to_string(),
    }
}

/// Output path for `source` inside `dir`: `<dir>/<stem>.xml`.
pub fn xform_path(dir: &Path, source: &Path) -> PathBuf {
    dir.join(format!("{}.xml", form_stem(source)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_name_is_unchanged() {
        assert_eq!(sanitize_filename("survey.xlsx").unwrap(), "survey.xlsx");
        assert_eq!(
            sanitize_filename("Household Survey-v2.xls").unwrap(),
            "Household Survey-v2.xls"
        );
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("/abs/path/form.xlsx").unwrap(), "form.xlsx");
        assert_eq!(
            sanitize_filename(r"C:\Users\me\form.xlsx").unwrap(),
            "form.xlsx"
        );
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a\"b;c.xlsx").unwrap(), "a_b_c.xlsx");
        assert_eq!(sanitize_filename("encuesta_ñ.xlsx").unwrap(), "encuesta__.xlsx");
    }

    #[test]
    fn test_sanitize_strips_leading_dots() {
        assert_eq!(sanitize_filename(".hidden.xlsx").unwrap(), "hidden.xlsx");
    }

    #[test]
    fn test_sanitize_rejects_empty_results() {
        for raw in ["", "..", ".", "../", "dir/", "???"] {
            assert!(
                matches!(sanitize_filename(raw), Err(XformError::InvalidFilename { .. })),
                "expected rejection for {raw:?}"
            );
        }
    }

    #[test]
    fn test_sanitize_truncates_long_names_keeping_extension() {
        let long = format!("{}.xlsx", "a".repeat(300));
        let name = sanitize_filename(&long).unwrap();
        assert!(name.ends_with(".xlsx"), "got: {name}");
        assert!(name.len() + PART_SUFFIX.len() <= 255);
        assert_eq!(name.len(), MAX_FILENAME_BYTES);
    }

    #[test]
    fn test_sanitize_truncates_names_without_short_extension() {
        let long = "b".repeat(300);
        assert_eq!(sanitize_filename(&long).unwrap(), "b".repeat(MAX_FILENAME_BYTES));

        let odd = format!("form.{}", "c".repeat(300));
        assert_eq!(sanitize_filename(&odd).unwrap().len(), MAX_FILENAME_BYTES);
    }

    #[test]
    fn test_sanitize_keeps_names_at_the_limit() {
        let exact = format!("{}.xls", "d".repeat(MAX_FILENAME_BYTES - 4));
        assert_eq!(sanitize_filename(&exact).unwrap(), exact);
    }

    #[test]
    fn test_form_stem_uses_text_before_first_dot() {
        assert_eq!(form_stem(Path::new("uploads/x/survey.xlsx")), "survey");
        assert_eq!(form_stem(Path::new("household.v2.xls")), "household");
        assert_eq!(form_stem(Path::new("noext")), "noext");
    }

    #[test]
    fn test_form_stem_falls_back_when_empty() {
        assert_eq!(form_stem(Path::new(".xlsx")), "form");
    }

    #[test]
    fn test_xform_path() {
        assert_eq!(
            xform_path(Path::new("/tmp/out"), Path::new("uploads/abc/survey.xlsx")),
            PathBuf::from("/tmp/out/survey.xml")
        );
    }

    #[tokio::test]
    async fn test_from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.xlsx");
        std::fs::write(&path, b"PK\x03\x04").unwrap();

        let upload = Upload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name(), "survey.xlsx");
        assert_eq!(upload.len(), 4);
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = Upload::from_path("/definitely/not/here.xlsx").await.unwrap_err();
        assert!(matches!(err, XformError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_from_path_directory_keeps_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Upload::from_path(dir.path()).await.unwrap_err();
        assert!(matches!(err, XformError::ReadFailed { .. }), "got: {err:?}");
    }
}
