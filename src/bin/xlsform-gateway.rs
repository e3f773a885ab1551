//! CLI binary for xlsform-gateway.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `convert` pushes one local spreadsheet through the same pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use xlsform_gateway::pipeline::upload::form_stem;
use xlsform_gateway::{
    server, ConversionProgressCallback, ConversionService, ProgressCallback, ServiceConfig,
    ServiceConfigBuilder, Upload,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner for a single `convert` run.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading spreadsheet…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn elapsed(&self) -> String {
        dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_upload_staged(&self, _staged: &Path, bytes: usize) {
        self.bar.set_prefix("Staged");
        self.bar.set_message(dim(&format!("{bytes} bytes")));
    }

    fn on_conversion_start(&self, _source: &Path) {
        self.bar.set_prefix("Converting");
        self.bar.set_message("running xls2xform…");
    }

    fn on_conversion_complete(&self, output: &Path) {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar
            .println(format!("  {} {}  {}", green("✓"), name, self.elapsed()));
    }

    fn on_conversion_error(&self, message: &str) {
        self.bar
            .println(format!("  {} {}  {}", red("✗"), red(message), self.elapsed()));
    }

    fn on_cleanup_complete(&self, _staged: &Path) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the service on the default address (127.0.0.1:8000)
  xlsform-gateway serve

  # Listen on all interfaces with a 20 MiB upload limit
  xlsform-gateway serve --bind 0.0.0.0:8000 --max-upload-mb 20

  # Use pyxform through a specific interpreter
  xlsform-gateway serve --converter "python3 -m pyxform.xls2xform"

  # Convert one file locally (writes survey.xml)
  xlsform-gateway convert survey.xlsx

  # Convert to an explicit path
  xlsform-gateway convert survey.xlsx -o build/survey.xml

HTTP API:
  GET  /               landing page with an upload form
  POST /xls/to/xform   multipart field "file" → XForm attachment
                       500 {"detail": "Failed to convert XLS to XForm: ..."} on failure

ENVIRONMENT VARIABLES:
  XLSFORM_BIND               Listen address for `serve`
  XLSFORM_UPLOAD_DIR         Staging directory for uploads
  XLSFORM_CONVERTER          Converter command (default: xls2xform)
  XLSFORM_CONVERTER_TIMEOUT  Converter timeout in seconds
  XLSFORM_MAX_UPLOAD_MB      Upload size limit for `serve`
  XLSFORM_ODK_VALIDATE       Run ODK Validate on every form
  RUST_LOG                   Log filter, overrides --verbose/--quiet

SETUP:
  1. Install pyxform:  pip install pyxform
  2. Serve:            xlsform-gateway serve
"#;

/// Convert XLSForm spreadsheets to XForm XML.
#[derive(Parser, Debug)]
#[command(
    name = "xlsform-gateway",
    version,
    about = "Convert XLSForm spreadsheets to XForm XML, over HTTP or locally",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "XLSFORM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "XLSFORM_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Convert a local XLSForm file.
    Convert(ConvertArgs),
}

/// Settings shared by both subcommands.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Directory uploads are staged in.
    #[arg(long, env = "XLSFORM_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Converter command; extra words become leading arguments.
    #[arg(long, env = "XLSFORM_CONVERTER", default_value = "xls2xform")]
    converter: String,

    /// Converter timeout in seconds.
    #[arg(long, env = "XLSFORM_CONVERTER_TIMEOUT", default_value_t = 120)]
    converter_timeout: u64,

    /// Emit compact rather than indented XML.
    #[arg(long)]
    no_pretty_print: bool,

    /// Run ODK Validate on each form (needs Java on this host).
    #[arg(long, env = "XLSFORM_ODK_VALIDATE")]
    odk_validate: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "XLSFORM_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Maximum request body size in MiB.
    #[arg(long, env = "XLSFORM_MAX_UPLOAD_MB", default_value_t = 10)]
    max_upload_mb: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// XLSForm spreadsheet (.xlsx or .xls).
    input: PathBuf,

    /// Write the XForm here instead of ./<form>.xml.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // A one-shot conversion shows a spinner; INFO logs would only tear it.
    let show_progress = !cli.quiet && matches!(cli.command, Command::Convert(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Convert(args) => run_convert(args, show_progress && !cli.verbose, cli.quiet).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = pipeline_config(&args.pipeline)
        .bind_addr(args.bind)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024))
        .build()
        .context("Invalid configuration")?;

    let service = ConversionService::from_config(&config)
        .await
        .with_context(|| {
            format!(
                "Failed to prepare upload directory {}",
                config.upload_dir.display()
            )
        })?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        converter = %config.converter_program,
        max_upload_bytes = config.max_upload_bytes,
        "Server ready and accepting connections"
    );

    let app = server::router(Arc::new(service), config.max_upload_bytes);
    server::serve(listener, app, server::shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let mut builder = pipeline_config(&args.pipeline);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.xml", form_stem(&args.input))));

    let upload = Upload::from_path(&args.input)
        .await
        .context("Failed to read input")?;
    let service = ConversionService::from_config(&config)
        .await
        .context("Failed to prepare upload directory")?;

    let started = Instant::now();
    let written = service
        .convert_to_file(upload, &output)
        .await
        .context("Conversion failed")?;

    if !quiet {
        eprintln!(
            "{}  {}ms  →  {}",
            green("✔"),
            started.elapsed().as_millis(),
            bold(&written.display().to_string()),
        );
    }
    Ok(())
}

/// Map the shared flags onto a config builder.
fn pipeline_config(args: &PipelineArgs) -> ServiceConfigBuilder {
    ServiceConfig::builder()
        .upload_dir(args.upload_dir.clone())
        .converter_command(&args.converter)
        .converter_timeout_secs(args.converter_timeout)
        .pretty_print(!args.no_pretty_print)
        .odk_validate(args.odk_validate)
}
