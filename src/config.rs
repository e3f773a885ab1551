//! Configuration types for the conversion service.
//!
//! Every knob of the service lives in [`ServiceConfig`], built via its
//! [`ServiceConfigBuilder`]. The binary maps CLI flags and environment
//! variables onto the builder; library users set only what they need and rely
//! on the defaults below for the rest.

use crate::error::XformError;
use crate::progress::ConversionProgressCallback;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload staging root, relative to the working directory.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default converter executable (pyxform's command-line entry point).
pub const DEFAULT_CONVERTER: &str = "xls2xform";

/// Configuration for the conversion service.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use xlsform_gateway::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .upload_dir("/var/tmp/xlsform-uploads")
///     .converter_command("python3 -m pyxform.xls2xform")
///     .converter_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Root directory under which uploads are staged. Default: `uploads`.
    ///
    /// Each request stages into its own subdirectory, which is removed again
    /// once the conversion finishes.
    pub upload_dir: PathBuf,

    /// Address the HTTP server listens on. Default: `127.0.0.1:8000`.
    pub bind_addr: SocketAddr,

    /// Converter executable. Default: `xls2xform`.
    pub converter_program: String,

    /// Arguments placed before the converter's own flags, e.g.
    /// `["-m", "pyxform.xls2xform"]` when `converter_program` is `python3`.
    pub converter_args: Vec<String>,

    /// Wall-clock limit for a single converter run, in seconds. Default: 120.
    ///
    /// The converter process is killed when the limit is hit.
    pub converter_timeout_secs: u64,

    /// Ask the converter for indented XML. Default: true.
    pub pretty_print: bool,

    /// Run ODK Validate on every converted form. Default: false.
    ///
    /// Needs Java and the validator on the converter's host; when off the
    /// converter is told to skip external validation entirely.
    pub odk_validate: bool,

    /// Largest accepted request body in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// Optional per-request stage notifications.
    pub progress_callback: Option<Arc<dyn ConversionProgressCallback>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            converter_program: DEFAULT_CONVERTER.to_string(),
            converter_args: Vec::new(),
            converter_timeout_secs: 120,
            pretty_print: true,
            odk_validate: false,
            max_upload_bytes: 10 * 1024 * 1024,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("upload_dir", &self.upload_dir)
            .field("bind_addr", &self.bind_addr)
            .field("converter_program", &self.converter_program)
            .field("converter_args", &self.converter_args)
            .field("converter_timeout_secs", &self.converter_timeout_secs)
            .field("pretty_print", &self.pretty_print)
            .field("odk_validate", &self.odk_validate)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn converter_program(mut self, program: impl Into<String>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set program and leading arguments from one whitespace-separated
    /// command line, e.g. `"python3 -m pyxform.xls2xform"`.
    pub fn converter_command(mut self, command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        self.config.converter_program = parts.next().unwrap_or_default();
        self.config.converter_args = parts.collect();
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn pretty_print(mut self, v: bool) -> Self {
        self.config.pretty_print = v;
        self
    }

    pub fn odk_validate(mut self, v: bool) -> Self {
        self.config.odk_validate = v;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ConversionProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, XformError> {
        let c = &self.config;
        if c.upload_dir.as_os_str().is_empty() {
            return Err(XformError::InvalidConfig(
                "Upload directory must not be empty".into(),
            ));
        }
        if c.converter_program.trim().is_empty() {
            return Err(XformError::InvalidConfig(
                "Converter program must not be empty".into(),
            ));
        }
        if c.converter_timeout_secs == 0 {
            return Err(XformError::InvalidConfig(
                "Converter timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes < 1024 {
            return Err(XformError::InvalidConfig(format!(
                "Upload limit must be ≥ 1024 bytes, got {}",
                c.max_upload_bytes
            )));
        }
        Ok(self.config)
    }
}
