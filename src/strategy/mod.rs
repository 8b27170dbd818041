//! Conversion strategies as data.
//!
//! A [`Strategy`] is a compile-time record: an id, a time budget, an output
//! floor and an [`Action`] describing which tool runs with which arguments.
//! Chains are plain `Vec<Strategy>` built per request shape by
//! [`chain_for`]; the executor in [`crate::pipeline::chain`] is their only
//! consumer.
//!
//! ```text
//! office → pdf   soffice:pdf
//! pdf → docx     remote → pdf2docx → soffice:writer… → text:docx
//! pdf → xlsx     remote → soffice:calc… → text:xlsx
//! pdf → pptx     remote → soffice:impress… → soffice:draw…
//! compress       gs:<preset> → qpdf:recompress        (text-based)
//!                gs:images-<q> → gs:<preset> → qpdf:recompress  (image-heavy)
//! protect        qpdf:aes256 → pdftk:aes128 → qpdf:aes256-positional
//! ```

pub mod compress;
pub mod office;
pub mod ooxml;
pub mod protect;
pub mod remote;

use crate::config::EngineConfig;
use crate::error::ConversionError;
use crate::model::{ConversionRequest, DocumentProfile, Operation, Quality, SourceKind, TargetFormat};
use crate::pipeline::runner::Invocation;
use crate::pipeline::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tool_probe::{ResolvedTools, Tool};

/// How a strategy reaches its converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    ExternalTool,
    RemoteService,
}

/// Whether a signature mismatch fails the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Enforced,
    /// Logged only; the size floor still applies.
    Advisory,
}

/// Ghostscript parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsPreset {
    /// `-dPDFSETTINGS` preset for text-based documents.
    Text(Quality),
    /// Explicit downsampling and JPEG recompression for image-heavy documents.
    ImageHeavy(Quality),
}

/// What a strategy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `soffice --convert-to`, optionally forcing an import filter.
    OfficeExport {
        infilter: Option<&'static str>,
        convert_to: &'static str,
    },
    /// The `pdf2docx` command-line converter.
    Pdf2Docx,
    Ghostscript(GsPreset),
    /// Stream recompression and linearisation with qpdf.
    QpdfRecompress,
    /// qpdf `--encrypt` with named password options.
    QpdfEncrypt,
    /// pdftk `encrypt_128bit`.
    PdftkEncrypt,
    /// qpdf `--encrypt` with positional passwords, for older qpdf releases.
    QpdfEncryptPositional,
    /// The remote conversion server.
    Remote,
    /// Extract text with pdftotext and package it as OOXML natively.
    TextOoxml,
}

/// One entry of a strategy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub id: &'static str,
    pub kind: StrategyKind,
    pub action: Action,
    pub timeout: Duration,
    /// Output floor on top of the validator's own minimum.
    pub min_output_bytes: usize,
    pub signature: SignatureCheck,
    /// Reject outputs that carry no `/Encrypt` dictionary.
    pub require_encryption: bool,
}

impl Strategy {
    pub(crate) fn tool(id: &'static str, action: Action, timeout: Duration, min_output_bytes: usize) -> Self {
        Self {
            id,
            kind: StrategyKind::ExternalTool,
            action,
            timeout,
            min_output_bytes,
            signature: SignatureCheck::Enforced,
            require_encryption: false,
        }
    }

    /// The binary this strategy invokes, if any.
    pub fn required_tool(&self) -> Option<Tool> {
        match self.action {
            Action::OfficeExport { .. } => Some(Tool::Soffice),
            Action::Pdf2Docx => Some(Tool::Pdf2docx),
            Action::Ghostscript(_) => Some(Tool::Ghostscript),
            Action::QpdfRecompress | Action::QpdfEncrypt | Action::QpdfEncryptPositional => Some(Tool::Qpdf),
            Action::PdftkEncrypt => Some(Tool::Pdftk),
            Action::TextOoxml => Some(Tool::Pdftotext),
            Action::Remote => None,
        }
    }

    /// Build the concrete invocation for this request. Pure apart from path naming.
    pub fn plan(&self, ctx: &StrategyContext<'_>) -> Plan {
        match self.action {
            Action::OfficeExport { infilter, convert_to } => office::plan_export(self, ctx, infilter, convert_to),
            Action::Pdf2Docx => office::plan_pdf2docx(self, ctx),
            Action::Ghostscript(preset) => compress::plan_ghostscript(self, ctx, preset),
            Action::QpdfRecompress => compress::plan_qpdf(self, ctx),
            Action::QpdfEncrypt | Action::PdftkEncrypt | Action::QpdfEncryptPositional => {
                protect::plan_encrypt(self, ctx)
            }
            Action::TextOoxml => ooxml::plan_extract(self, ctx),
            Action::Remote => Plan::Remote,
        }
    }
}

/// Everything a strategy may look at while building its invocation.
pub struct StrategyContext<'a> {
    pub request: &'a ConversionRequest,
    pub workspace: &'a Workspace,
    /// The request's source bytes, already written to the workspace.
    pub input: &'a Path,
    pub tools: &'a ResolvedTools,
}

impl StrategyContext<'_> {
    pub(crate) fn invocation(&self, strategy: &Strategy, tool: Tool) -> Invocation {
        Invocation::new(tool, self.tools.program(tool), strategy.timeout).cwd(self.workspace.dir())
    }

    /// Where a tool that takes an explicit output path should write.
    pub(crate) fn output_path(&self) -> PathBuf {
        self.workspace.path("output", self.request.target_format().extension())
    }
}

/// A built strategy, ready for the executor.
#[derive(Debug)]
pub enum Plan {
    /// Run the invocation, then read the first existing candidate.
    Process {
        invocation: Invocation,
        outputs: Vec<PathBuf>,
    },
    /// Run the invocation and package its stdout as `target`.
    ExtractText {
        invocation: Invocation,
        target: TargetFormat,
    },
    /// Hand the request to the remote conversion server.
    Remote,
}

/// Supported (source, operation) shapes and their chains.
///
/// `profile` is consulted only for compression, where it selects the
/// image-heavy branch.
pub fn chain_for(
    request: &ConversionRequest,
    profile: Option<&DocumentProfile>,
    config: &EngineConfig,
) -> Result<Vec<Strategy>, ConversionError> {
    let t = &config.timeouts;
    match (request.source_kind(), request.operation()) {
        (kind, Operation::Convert { target: TargetFormat::Pdf }) if kind.is_office() => {
            Ok(office::office_to_pdf(t))
        }
        (SourceKind::Pdf, Operation::Convert { target }) if target.is_ooxml() => {
            Ok(office::pdf_to_office(*target, config.remote.as_ref(), t))
        }
        (SourceKind::Pdf, Operation::Compress { quality }) => {
            let image_heavy = profile.is_some_and(DocumentProfile::is_image_heavy);
            Ok(compress::chain(*quality, image_heavy, t))
        }
        (SourceKind::Pdf, Operation::Protect { password }) => Ok(protect::chain(t, password)),
        (kind, op) => Err(ConversionError::validation(format!(
            "unsupported operation {:?} for a {kind} source",
            op
        ))),
    }
}

/// `file://` URL for a local directory, as LibreOffice expects for `-env:` options.
pub(crate) fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}
