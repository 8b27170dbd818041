//! # docshift
//!
//! Office ⇄ PDF conversion, PDF compression and PDF password protection,
//! done by driving the usual command-line tools (LibreOffice, Ghostscript,
//! qpdf, pdftk, poppler, pdf2docx) through ordered fallback chains.
//!
//! ## Why this crate?
//!
//! No single tool handles every document. LibreOffice chokes on some PDFs
//! that pdf2docx handles and the reverse is also true; Ghostscript can
//! make image-heavy scans larger, not smaller; pdftk is missing on many
//! hosts where qpdf is present. Instead of betting on one tool this crate
//! tries an ordered list of strategies per operation, validates every
//! output, and only fails once the whole chain is exhausted, with one
//! structured error that says what was tried and why it failed.
//!
//! ## Request Lifecycle
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Validate   size limit, input signature, supported pair, password
//!  ├─ 2. Workspace  per-request scratch files named <token>_<label>.<ext>
//!  ├─ 3. Classify   pdfinfo + pdftotext → DocumentProfile (compression only,
//!  │                or lazily when a failure needs a hint)
//!  ├─ 4. Chain      strategies in order; first validated output wins
//!  ├─ 5. Report     winner bytes, or one ConversionError
//!  └─ 6. Cleanup    every <token>_* entry removed, on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshift::{Converter, EngineConfig, SourceKind, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(EngineConfig::from_env()?)?;
//!     let pdf = std::fs::read("report.pdf")?;
//!     let docx = converter.convert(pdf, SourceKind::Pdf, TargetFormat::Docx).await?;
//!     std::fs::write("report.docx", docx)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshift` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Library-only users can skip the CLI dependencies:
//! ```toml
//! docshift = { version = "0.1", default-features = false }
//! ```
//!
//! ## Tools per Operation
//!
//! | Operation | Chain |
//! |-----------|-------|
//! | Office → PDF | `soffice` |
//! | PDF → DOCX | remote server, `pdf2docx`, `soffice` (writer import, then default), `pdftotext` text package |
//! | PDF → XLSX | remote server, `soffice` (calc import, then default), `pdftotext` text package |
//! | PDF → PPTX | remote server, `soffice` (impress import, then draw import) |
//! | Compress | `gs` (image-aware preset when the PDF is image-heavy), then `qpdf` |
//! | Protect | `qpdf` AES-256, `pdftk` AES-128, `qpdf` positional syntax |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod input;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, EngineConfigBuilder, RemoteServerConfig, Timeouts};
pub use convert::{write_output, ConversionOutput, Converter};
pub use error::{ConversionError, ErrorKind, FailureCause, ProcessError};
pub use input::{load_source, SourceDocument};
pub use model::{
    ConversionRequest, DocumentProfile, Operation, OutcomeStatus, Quality, SourceKind, StrategyOutcome,
    TargetFormat,
};
pub use pipeline::runner::{CancelToken, Invocation, ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use progress::{ChainProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tool_probe::{Tool, ToolPaths, ToolStatus};
