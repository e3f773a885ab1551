//! Conversion Gateway: turn a staged XLSForm into an XForm XML file.
//!
//! The form grammar belongs to pyxform, not to this crate. [`XformConverter`]
//! is the seam: the orchestrator only knows "a source path goes in, a
//! [`ConvertedForm`] comes out", so any compliant engine can stand behind it.
//!
//! ## Why a subprocess?
//!
//! pyxform is a Python library with no Rust equivalent. Running its
//! `xls2xform` entry point as a child process keeps the grammar's error
//! vocabulary intact (its messages are passed to the client verbatim) and
//! confines a misbehaving conversion to a process we can time out and kill.

use crate::config::ServiceConfig;
use crate::error::ConverterError;
use crate::pipeline::upload::xform_path;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// pyxform report codes meaning "converted".
const CODE_OK: i64 = 100;
const CODE_OK_WITH_WARNINGS: i64 = 101;

/// Maps a source spreadsheet to a converted XForm.
#[async_trait]
pub trait XformConverter: Send + Sync {
    /// Convert the file at `source`. The result never lives at `source`.
    async fn convert(&self, source: &Path) -> Result<ConvertedForm, ConverterError>;
}

/// A converted XForm in a private temporary directory.
///
/// The directory (and the XML in it) is deleted when this value is dropped.
/// [`ConvertedForm::into_stream`] moves it into the returned stream, so an
/// HTTP response body keeps the file alive exactly as long as it is being
/// sent.
#[derive(Debug)]
pub struct ConvertedForm {
    path: PathBuf,
    _dir: TempDir,
}

impl ConvertedForm {
    /// Wrap an output file. `path` must lie inside `dir`.
    pub fn new(dir: TempDir, path: PathBuf) -> Self {
        Self { path, _dir: dir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Suggested download name, e.g. `survey.xml`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "form.xml".to_string())
    }

    /// Open the XML for streaming. The temporary directory is removed once
    /// the stream is dropped.
    pub async fn into_stream(
        self,
    ) -> std::io::Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        let file = tokio::fs::File::open(&self.path).await?;
        let form = self;
        Ok(ReaderStream::new(file).map(move |chunk| {
            let _held: &ConvertedForm = &form;
            chunk
        }))
    }
}

/// Allocate a fresh output directory and the XForm path for `source` in it.
///
/// Shared by every [`XformConverter`] so output naming stays consistent.
pub fn prepare_output(source: &Path) -> Result<(TempDir, PathBuf), ConverterError> {
    let dir = tempfile::Builder::new()
        .prefix("xform-")
        .tempdir()
        .map_err(ConverterError::OutputDir)?;
    let path = xform_path(dir.path(), source);
    Ok((dir, path))
}

/// The `--json` report pyxform prints: `{"code": 100, "message": "Ok!", "warnings": []}`.
#[derive(Debug, Deserialize)]
struct ConverterReport {
    code: Option<i64>,
    message: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

impl ConverterReport {
    fn is_success(&self) -> bool {
        matches!(self.code, Some(CODE_OK) | Some(CODE_OK_WITH_WARNINGS))
    }
}

/// Find the last line carrying a JSON report. Depending on the pyxform
/// version the report goes to stdout or through a logger (possibly with a
/// `INFO:` style prefix), so anything before the first `{` is ignored.
fn find_report(output: &str) -> Option<ConverterReport> {
    output.lines().rev().find_map(|line| {
        let start = line.find('{')?;
        serde_json::from_str::<ConverterReport>(line[start..].trim_end())
            .ok()
            .filter(|r| r.code.is_some())
    })
}

/// [`XformConverter`] that runs pyxform's `xls2xform` command.
///
/// Invocation:
/// `<program> <args..> --json (--skip_validate | --odk_validate) [--pretty_print] <source> <output>`.
///
/// External validation is skipped unless asked for; `xls2xform` would
/// otherwise run ODK Validate, which needs Java on the host.
#[derive(Debug, Clone)]
pub struct PyxformCli {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    pretty_print: bool,
    odk_validate: bool,
}

impl PyxformCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(120),
            pretty_print: true,
            odk_validate: false,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            program: config.converter_program.clone(),
            args: config.converter_args.clone(),
            timeout: Duration::from_secs(config.converter_timeout_secs),
            pretty_print: config.pretty_print,
            odk_validate: config.odk_validate,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pretty_print(mut self, v: bool) -> Self {
        self.pretty_print = v;
        self
    }

    pub fn with_odk_validate(mut self, v: bool) -> Self {
        self.odk_validate = v;
        self
    }
}

#[async_trait]
impl XformConverter for PyxformCli {
    async fn convert(&self, source: &Path) -> Result<ConvertedForm, ConverterError> {
        let (dir, output) = prepare_output(source)?;
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("--json");
        cmd.arg(if self.odk_validate {
            "--odk_validate"
        } else {
            "--skip_validate"
        });
        if self.pretty_print {
            cmd.arg("--pretty_print");
        }
        cmd.arg(source)
            .arg(&output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            program = %self.program,
            source = %source.display(),
            output = %output.display(),
            "Running converter"
        );

        let result = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(ConverterError::Timeout {
                    after: self.timeout,
                })
            }
            Ok(Err(e)) => {
                return Err(ConverterError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })
            }
            Ok(Ok(out)) => out,
        };

        let stdout = String::from_utf8_lossy(&result.stdout);
        let stderr = String::from_utf8_lossy(&result.stderr);

        match find_report(&stdout).or_else(|| find_report(&stderr)) {
            Some(report) if report.is_success() => {
                for w in &report.warnings {
                    warn!(source = %source.display(), "Converter warning: {}", w);
                }
            }
            Some(report) => {
                let message = report
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| format!("converter reported code {:?}", report.code));
                return Err(ConverterError::Rejected { message });
            }
            None if !result.status.success() => {
                return Err(ConverterError::Crashed {
                    status: result.status.to_string(),
                    stderr: stderr.trim().to_string(),
                });
            }
            None => {}
        }

        match tokio::fs::metadata(&output).await {
            Ok(m) if m.len() > 0 => {}
            _ => return Err(ConverterError::MissingOutput { path: output }),
        }

        info!(
            source = %source.display(),
            output = %output.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Converted XLSForm to XForm"
        );
        Ok(ConvertedForm::new(dir, output))
    }
}
