//! CLI binary for docshift.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `EngineConfig` / `ConversionRequest` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docshift::{
    load_source, write_output, CancelToken, ChainProgressCallback, ConversionError, ConversionOutput,
    ConversionRequest, Converter, EngineConfig, ErrorKind, ProgressCallback, Quality, RemoteServerConfig,
    SourceKind, TargetFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the strategy being tried, with one log line per attempt.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }
}

impl ChainProgressCallback for CliProgressCallback {
    fn on_chain_start(&self, operation: &str, strategies: usize) {
        self.bar.set_prefix(operation.to_string());
        self.bar.set_message(format!("{strategies} strategies"));
    }

    fn on_strategy_start(&self, index: usize, total: usize, strategy_id: &str) {
        self.bar.set_message(format!("[{index}/{total}] {strategy_id}"));
    }

    fn on_strategy_success(&self, strategy_id: &str, output_bytes: usize) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            strategy_id,
            dim(&format!("{output_bytes} bytes"))
        ));
    }

    fn on_strategy_failed(&self, strategy_id: &str, diagnostic: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(format!("  {} {:<24} {}", red("✗"), strategy_id, dim(diagnostic)));
    }

    fn on_chain_complete(&self, _success: bool, _attempts: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Office → PDF (source kind taken from the extension)
  docshift convert report.docx --to pdf

  # PDF → Word, written next to the input
  docshift convert scan.pdf --to docx -o scan.docx

  # Compress an image-heavy PDF
  docshift compress brochure.pdf --quality low -o brochure.small.pdf

  # Password-protect
  DOCSHIFT_PASSWORD=s3cret docshift protect contract.pdf

  # Classify a PDF (pages, encryption, scanned, complex layout)
  docshift inspect paper.pdf --json

  # Which external tools were found?
  docshift tools

ENVIRONMENT VARIABLES:
  DOCSHIFT_SCRATCH_DIR    Scratch directory (default: $TMPDIR/docshift)
  DOCSHIFT_REMOTE_URL     Remote conversion server tried first for PDF → Office
  DOCSHIFT_CALLBACK_URL   Base URL the remote server can fetch uploads from
  DOCSHIFT_MAX_INPUT_MB   Largest accepted input (default: 100)
  DOCSHIFT_SOFFICE, DOCSHIFT_GS, DOCSHIFT_QPDF, DOCSHIFT_PDFTK,
  DOCSHIFT_PDFINFO, DOCSHIFT_PDFTOTEXT, DOCSHIFT_PDF2DOCX
                          Explicit path of each external tool
  RUST_LOG                Log filter, overrides --verbose/--quiet

EXIT CODES:
  0  success
  1  I/O error
  2  invalid request
  3  required tools not installed
  4  every strategy failed
  130 cancelled (Ctrl-C)
"#;

/// Convert, compress and protect documents with layered tool fallbacks.
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Convert, compress and protect documents with layered tool fallbacks",
    long_about = "Office ⇄ PDF conversion, PDF compression and PDF password protection. \
Each operation tries an ordered chain of tools (LibreOffice, Ghostscript, qpdf, pdftk, \
poppler, pdf2docx, an optional remote server) and returns the first validated result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Output structured JSON instead of human-readable text.
    #[arg(long, global = true, env = "DOCSHIFT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSHIFT_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "DOCSHIFT_NO_PROGRESS")]
    no_progress: bool,

    /// Scratch directory for intermediate files.
    #[arg(long, global = true, env = "DOCSHIFT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Remote conversion server tried first for PDF → Office.
    #[arg(long, global = true, env = "DOCSHIFT_REMOTE_URL")]
    remote_url: Option<String>,

    /// Base URL the remote server can fetch uploads from when upload fails.
    #[arg(long, global = true, env = "DOCSHIFT_CALLBACK_URL")]
    callback_url: Option<String>,

    /// HTTP download timeout in seconds, for URL inputs.
    #[arg(long, global = true, env = "DOCSHIFT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Office → PDF or PDF → DOCX/XLSX/PPTX.
    Convert {
        /// Local file path or HTTP/HTTPS URL.
        input: String,

        /// Target format: pdf, docx, xlsx or pptx.
        #[arg(long, short = 't', value_enum)]
        to: TargetArg,

        /// Source kind (pdf, word, excel, powerpoint); inferred from the extension if omitted.
        #[arg(long)]
        from: Option<String>,

        /// Output file (default: input name with the target extension).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Shrink a PDF. The original is kept if nothing smaller is produced.
    Compress {
        input: String,

        /// low, moderate or high.
        #[arg(long, default_value = "moderate")]
        quality: String,

        /// Output file (default: <name>.compressed.pdf).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt a PDF with a user/owner password.
    Protect {
        input: String,

        /// Password (4-128 characters).
        #[arg(long, env = "DOCSHIFT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Output file (default: <name>.protected.pdf).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the classifier's profile of a PDF.
    Inspect { input: String },

    /// Report which external tools were found.
    Tools,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
}

impl From<TargetArg> for TargetFormat {
    fn from(v: TargetArg) -> Self {
        match v {
            TargetArg::Pdf => TargetFormat::Pdf,
            TargetArg::Docx => TargetFormat::Docx,
            TargetArg::Xlsx => TargetFormat::Xlsx,
            TargetArg::Pptx => TargetFormat::Pptx,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.global.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err.downcast_ref::<ConversionError>().map(ConversionError::kind);
            if json {
                let body = serde_json::json!({
                    "error": kind,
                    "message": format!("{err:#}"),
                });
                println!("{body}");
            } else {
                eprintln!("{} {:#}", red("✘"), err);
            }
            ExitCode::from(exit_code(kind))
        }
    }
}

fn exit_code(kind: Option<ErrorKind>) -> u8 {
    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::ToolUnavailable) => 3,
        Some(ErrorKind::Exhausted) => 4,
        Some(ErrorKind::Cancelled) => 130,
        Some(ErrorKind::Io) | None => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let global = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports each attempt, so library INFO logs are
    // muted while it is visible.
    let show_progress = !global.quiet && !global.no_progress && !global.json;
    let filter = if global.verbose {
        "debug"
    } else if global.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress && !matches!(cli.command, Command::Tools) {
        Some(CliProgressCallback::new() as Arc<dyn ChainProgressCallback>)
    } else {
        None
    };
    let config = build_config(global, progress)?;
    let converter = Converter::new(config).context("Failed to initialise the engine")?;

    match &cli.command {
        Command::Tools => print_tools(&converter, global.json),
        Command::Inspect { input } => {
            let source = load(input, global, &converter).await?;
            let profile = converter
                .inspect(&source.bytes)
                .await
                .context("Failed to inspect PDF")?;
            if global.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&profile).context("Failed to serialise profile")?
                );
            } else {
                println!("File:           {}", input);
                println!("Pages:          {}", profile.page_count);
                println!("Encrypted:      {}", profile.is_encrypted);
                println!("Scanned:        {}", profile.is_scanned);
                println!("Complex layout: {}", profile.has_complex_layout);
                println!("Bytes/page:     {}", profile.bytes_per_page);
                println!("Image streams:  {}", profile.image_streams);
                println!("Image-heavy:    {}", profile.is_image_heavy());
                if profile.is_fallback {
                    println!("{}", yellow("(metadata tools unavailable; size-only estimate)"));
                }
            }
            Ok(())
        }
        Command::Convert {
            input,
            to,
            from,
            output,
        } => {
            let source = load(input, global, &converter).await?;
            let target = TargetFormat::from(*to);
            let kind = match from {
                Some(kind) => kind.parse::<SourceKind>()?,
                None => source
                    .extension()
                    .and_then(|ext| SourceKind::from_extension(&ext))
                    .with_context(|| format!("Cannot tell the source kind of '{input}'; pass --from"))?,
            };
            let out_path = output
                .clone()
                .unwrap_or_else(|| default_output(&source.filename, "", target.extension()));
            let request = ConversionRequest::convert(source.bytes, kind, target, &source.filename);
            execute(&converter, &request, &out_path, global).await
        }
        Command::Compress {
            input,
            quality,
            output,
        } => {
            let quality: Quality = quality.parse()?;
            let source = load(input, global, &converter).await?;
            let out_path = output
                .clone()
                .unwrap_or_else(|| default_output(&source.filename, ".compressed", "pdf"));
            let request = ConversionRequest::compress(source.bytes, quality, &source.filename);
            execute(&converter, &request, &out_path, global).await
        }
        Command::Protect {
            input,
            password,
            output,
        } => {
            let source = load(input, global, &converter).await?;
            let out_path = output
                .clone()
                .unwrap_or_else(|| default_output(&source.filename, ".protected", "pdf"));
            let request = ConversionRequest::protect(source.bytes, password, &source.filename)?;
            execute(&converter, &request, &out_path, global).await
        }
    }
}

/// Map global flags to `EngineConfig`, on top of the `DOCSHIFT_*` environment.
fn build_config(global: &GlobalArgs, progress: Option<ProgressCallback>) -> Result<EngineConfig> {
    let env = EngineConfig::from_env().context("Invalid DOCSHIFT_* environment")?;

    let mut builder = EngineConfig::builder()
        .tools(env.tools)
        .max_input_bytes(env.max_input_bytes)
        .scratch_dir(global.scratch_dir.clone().unwrap_or(env.scratch_dir));

    let remote = match &global.remote_url {
        Some(url) => Some(RemoteServerConfig::new(url.clone())),
        None => env.remote,
    };
    if let Some(mut remote) = remote {
        if let Some(cb) = &global.callback_url {
            remote = remote.callback_base_url(cb.clone());
        }
        builder = builder.remote(remote);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn load(input: &str, global: &GlobalArgs, converter: &Converter) -> Result<docshift::SourceDocument> {
    load_source(input, global.download_timeout, converter.config().max_input_bytes)
        .await
        .with_context(|| format!("Failed to load '{input}'"))
}

/// `<stem><suffix>.<ext>` in the current directory.
fn default_output(filename: &str, suffix: &str, ext: &str) -> PathBuf {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(format!("{stem}{suffix}.{ext}"))
}

/// Run one request with Ctrl-C wired to cancellation, then write the result.
async fn execute(converter: &Converter, request: &ConversionRequest, out_path: &Path, global: &GlobalArgs) -> Result<()> {
    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = converter.run(request, &cancel).await;
    watcher.abort();
    let output = result.with_context(|| format!("{} failed", request.describe()))?;

    write_output(out_path, &output.bytes).await?;
    report(&output, out_path, global)
}

fn report(output: &ConversionOutput, out_path: &Path, global: &GlobalArgs) -> Result<()> {
    if global.json {
        let mut value = serde_json::to_value(output).context("Failed to serialise output")?;
        value["output_path"] = serde_json::Value::String(out_path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&value).context("Failed to serialise output")?);
        return Ok(());
    }
    if global.quiet {
        return Ok(());
    }

    let note = if output.unchanged {
        yellow("  (no smaller result; original kept)")
    } else {
        String::new()
    };
    eprintln!(
        "{}  {}  {} → {} bytes  {}ms  →  {}{}",
        green("✔"),
        output.strategy,
        output.input_bytes,
        output.output_bytes,
        output.elapsed_ms,
        bold(&out_path.display().to_string()),
        note,
    );
    let failed = output.attempts.iter().filter(|a| !a.is_success()).count();
    if failed > 0 {
        eprintln!("   {}", dim(&format!("{failed} earlier strategy attempt(s) failed")));
    }
    Ok(())
}

fn print_tools(converter: &Converter, json: bool) -> Result<()> {
    let report = converter.tool_report();
    if json {
        let rows: Vec<_> = report
            .iter()
            .map(|s| {
                serde_json::json!({
                    "tool": s.tool.id(),
                    "name": s.tool.display_name(),
                    "path": s.path.as_ref().map(|p| p.display().to_string()),
                    "env": s.tool.env_var(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows).context("Failed to serialise report")?);
        return Ok(());
    }

    for status in &report {
        match &status.path {
            Some(path) => println!(
                "{} {:<14} {}",
                green("✓"),
                status.tool.display_name(),
                dim(&path.display().to_string())
            ),
            None => println!(
                "{} {:<14} {}",
                red("✗"),
                status.tool.display_name(),
                dim(status.tool.install_hint())
            ),
        }
    }
    Ok(())
}
