//! Request, profile and outcome types shared by every stage.
//!
//! A [`ConversionRequest`] is created once per call and never mutated; the
//! pipeline borrows it for the whole operation. [`DocumentProfile`] is the
//! heuristic snapshot the classifier derives from a PDF, and
//! [`StrategyOutcome`] records what happened to each attempt in a chain.

use crate::error::{ConversionError, FailureCause};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Password length bounds for PDF protection (inclusive).
pub const PASSWORD_MIN_LEN: usize = 4;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Longest filename stem kept after sanitisation.
const FILENAME_MAX_LEN: usize = 100;

// ── Kinds ────────────────────────────────────────────────────────────────

/// The declared type of the input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Word,
    Excel,
    #[serde(rename = "powerpoint")]
    PowerPoint,
}

impl SourceKind {
    /// Map an upload MIME type to a source kind.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => Some(SourceKind::Pdf),
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.oasis.opendocument.text"
            | "application/rtf"
            | "text/rtf" => Some(SourceKind::Word),
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet" => Some(SourceKind::Excel),
            "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "application/vnd.oasis.opendocument.presentation" => Some(SourceKind::PowerPoint),
            _ => None,
        }
    }

    /// Map a file extension (without the dot) to a source kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(SourceKind::Pdf),
            "doc" | "docx" | "odt" | "rtf" => Some(SourceKind::Word),
            "xls" | "xlsx" | "ods" => Some(SourceKind::Excel),
            "ppt" | "pptx" | "odp" => Some(SourceKind::PowerPoint),
            _ => None,
        }
    }

    /// Extension used for the scratch copy when the filename has none we recognise.
    pub fn default_extension(self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Word => "docx",
            SourceKind::Excel => "xlsx",
            SourceKind::PowerPoint => "pptx",
        }
    }

    pub fn is_office(self) -> bool {
        !matches!(self, SourceKind::Pdf)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Word => "word",
            SourceKind::Excel => "excel",
            SourceKind::PowerPoint => "powerpoint",
        })
    }
}

impl FromStr for SourceKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(SourceKind::Pdf),
            "word" => Ok(SourceKind::Word),
            "excel" => Ok(SourceKind::Excel),
            "powerpoint" => Ok(SourceKind::PowerPoint),
            other => SourceKind::from_extension(other).ok_or_else(|| {
                ConversionError::validation(format!("unsupported source kind '{other}'"))
            }),
        }
    }
}

/// The requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
            TargetFormat::Xlsx => "xlsx",
            TargetFormat::Pptx => "pptx",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            TargetFormat::Pdf => "application/pdf",
            TargetFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            TargetFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            TargetFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }

    /// True for the ZIP-based Office Open XML formats.
    pub fn is_ooxml(self) -> bool {
        !matches!(self, TargetFormat::Pdf)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(TargetFormat::Pdf),
            "docx" | "word" => Ok(TargetFormat::Docx),
            "xlsx" | "excel" => Ok(TargetFormat::Xlsx),
            "pptx" | "powerpoint" => Ok(TargetFormat::Pptx),
            other => Err(ConversionError::validation(format!(
                "unsupported target format '{other}'"
            ))),
        }
    }
}

/// Output quality for compression. Lower quality means smaller files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Screen resolution (72 dpi images), strongest compression.
    Low,
    /// E-book resolution (150 dpi images). (default)
    #[default]
    Moderate,
    /// Print resolution (300 dpi images), lightest compression.
    High,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Low => "low",
            Quality::Moderate => "moderate",
            Quality::High => "high",
        })
    }
}

impl FromStr for Quality {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "moderate" | "medium" => Ok(Quality::Moderate),
            "high" => Ok(Quality::High),
            other => Err(ConversionError::validation(format!(
                "quality must be low, moderate or high (got '{other}')"
            ))),
        }
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// What the caller asked for.
#[derive(Clone, PartialEq, Eq)]
pub enum Operation {
    /// Change the document format.
    Convert { target: TargetFormat },
    /// Shrink a PDF.
    Compress { quality: Quality },
    /// Encrypt a PDF with a user password.
    Protect { password: String },
}

impl Operation {
    /// Format the chain must produce.
    pub fn target(&self) -> TargetFormat {
        match self {
            Operation::Convert { target } => *target,
            Operation::Compress { .. } | Operation::Protect { .. } => TargetFormat::Pdf,
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Convert { target } => f.debug_struct("Convert").field("target", target).finish(),
            Operation::Compress { quality } => {
                f.debug_struct("Compress").field("quality", quality).finish()
            }
            Operation::Protect { .. } => f.debug_struct("Protect").field("password", &"<redacted>").finish(),
        }
    }
}

/// One immutable unit of work.
///
/// Built through [`ConversionRequest::convert`], [`ConversionRequest::compress`]
/// or [`ConversionRequest::protect`]; parameter validation (password length,
/// filename sanitisation) happens here, before any tool runs.
#[derive(Clone)]
pub struct ConversionRequest {
    source_bytes: Vec<u8>,
    source_kind: SourceKind,
    operation: Operation,
    original_filename: String,
}

impl ConversionRequest {
    /// Format conversion (Office → PDF or PDF → Office).
    pub fn convert(
        bytes: impl Into<Vec<u8>>,
        source_kind: SourceKind,
        target: TargetFormat,
        filename: &str,
    ) -> Self {
        Self {
            source_bytes: bytes.into(),
            source_kind,
            operation: Operation::Convert { target },
            original_filename: sanitize_filename(filename, source_kind.default_extension()),
        }
    }

    /// PDF compression at the given quality.
    pub fn compress(bytes: impl Into<Vec<u8>>, quality: Quality, filename: &str) -> Self {
        Self {
            source_bytes: bytes.into(),
            source_kind: SourceKind::Pdf,
            operation: Operation::Compress { quality },
            original_filename: sanitize_filename(filename, "pdf"),
        }
    }

    /// PDF password protection. Fails if the password is out of bounds.
    pub fn protect(
        bytes: impl Into<Vec<u8>>,
        password: &str,
        filename: &str,
    ) -> Result<Self, ConversionError> {
        validate_password(password)?;
        Ok(Self {
            source_bytes: bytes.into(),
            source_kind: SourceKind::Pdf,
            operation: Operation::Protect {
                password: password.to_string(),
            },
            original_filename: sanitize_filename(filename, "pdf"),
        })
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn target_format(&self) -> TargetFormat {
        self.operation.target()
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// Compression quality, when this is a compression request.
    pub fn quality(&self) -> Option<Quality> {
        match self.operation {
            Operation::Compress { quality } => Some(quality),
            _ => None,
        }
    }

    /// Protection password, when this is a protection request.
    pub fn password(&self) -> Option<&str> {
        match &self.operation {
            Operation::Protect { password } => Some(password),
            _ => None,
        }
    }

    /// Extension for the scratch copy of the input.
    pub fn input_extension(&self) -> &str {
        self.original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| SourceKind::from_extension(ext) == Some(self.source_kind))
            .unwrap_or_else(|| self.source_kind.default_extension())
    }

    /// Human-readable operation name used in logs and errors.
    pub fn describe(&self) -> String {
        match &self.operation {
            Operation::Convert { target } => format!("{} → {}", self.source_kind, target),
            Operation::Compress { quality } => format!("PDF compression ({quality})"),
            Operation::Protect { .. } => "PDF protection".to_string(),
        }
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("source_bytes", &format_args!("<{} bytes>", self.source_bytes.len()))
            .field("source_kind", &self.source_kind)
            .field("operation", &self.operation)
            .field("original_filename", &self.original_filename)
            .finish()
    }
}

/// Check the password constraints before any tool is invoked.
pub fn validate_password(password: &str) -> Result<(), ConversionError> {
    let len = password.chars().count();
    if len == 0 {
        return Err(ConversionError::validation("password must not be empty"));
    }
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(ConversionError::validation(format!(
            "password must be {PASSWORD_MIN_LEN}–{PASSWORD_MAX_LEN} characters (got {len})"
        )));
    }
    // NUL cannot travel through argv.
    if password.contains('\0') {
        return Err(ConversionError::validation(
            "password must not contain NUL characters",
        ));
    }
    Ok(())
}

/// Reduce a user-supplied filename to `[A-Za-z0-9._-]`, without directories.
pub fn sanitize_filename(name: &str, default_ext: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("");
    let mut clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    clean = clean.trim_start_matches('.').to_string();

    let (stem, ext) = match clean.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() && !e.is_empty() => (s.to_string(), e.to_string()),
        _ => (clean.clone(), String::new()),
    };
    let stem: String = stem.chars().take(FILENAME_MAX_LEN).collect();
    let stem = if stem.trim_matches('_').is_empty() {
        "document".to_string()
    } else {
        stem
    };
    let ext = if ext.is_empty() { default_ext.to_string() } else { ext };
    format!("{stem}.{ext}")
}

// ── Profile ──────────────────────────────────────────────────────────────

/// Per-page size above which a PDF is treated as image-heavy.
pub const IMAGE_HEAVY_BYTES_PER_PAGE: u64 = 2 * 1024 * 1024;

/// Lower per-page bound for the image-stream heuristic.
const IMAGE_STREAM_BYTES_PER_PAGE: u64 = 512 * 1024;

/// Heuristic snapshot of a PDF. Advisory only.
///
/// Used to branch compression (image-heavy vs text-based) and to enrich
/// exhaustion diagnostics; never used to refuse a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProfile {
    pub page_count: u32,
    pub is_encrypted: bool,
    pub is_scanned: bool,
    pub has_complex_layout: bool,
    pub bytes_per_page: u64,
    /// Number of image XObjects found by sniffing the raw bytes.
    pub image_streams: usize,
    /// True when the metadata tool could not be used and defaults apply.
    pub is_fallback: bool,
}

impl DocumentProfile {
    /// Conservative profile used when classification fails.
    pub fn fallback(byte_len: usize, image_streams: usize) -> Self {
        Self {
            page_count: 1,
            is_encrypted: false,
            is_scanned: false,
            has_complex_layout: false,
            bytes_per_page: byte_len as u64,
            image_streams,
            is_fallback: true,
        }
    }

    /// Image-heavy PDFs get the aggressive downsampling command set.
    pub fn is_image_heavy(&self) -> bool {
        if self.bytes_per_page > IMAGE_HEAVY_BYTES_PER_PAGE {
            return true;
        }
        self.image_streams >= self.page_count.max(1) as usize
            && self.bytes_per_page > IMAGE_STREAM_BYTES_PER_PAGE
    }
}

impl Default for DocumentProfile {
    fn default() -> Self {
        Self::fallback(0, 0)
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────────

/// Coarse result of one strategy attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    RejectedInvalidOutput,
    ToolError,
    Timeout,
}

/// What happened when one strategy ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub strategy_id: String,
    pub status: OutcomeStatus,
    /// Size of the produced artifact, when one was read back.
    pub produced_bytes: Option<usize>,
    /// Sanitised one-line description, safe to show to callers. Empty on a
    /// clean success; a warning when the output was degraded.
    pub diagnostic: String,
    pub cause: Option<FailureCause>,
    pub duration_ms: u64,
}

impl StrategyOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_bounds() {
        assert!(validate_password("").is_err());
        assert!(validate_password("ab").is_err());
        assert!(validate_password("abc").is_err());
        assert!(validate_password("abcd").is_ok());
        assert!(validate_password(&"x".repeat(128)).is_ok());
        assert!(validate_password(&"x".repeat(129)).is_err());
        assert!(validate_password("ab\0cd").is_err());
    }

    #[test]
    fn password_length_counts_characters() {
        // 4 characters, 8 bytes
        assert!(validate_password("ñçßø").is_ok());
    }

    #[test]
    fn sanitize_strips_directories_and_specials() {
        assert_eq!(sanitize_filename("../../etc/passwd", "pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\My Report.docx", "docx"), "My_Report.docx");
        assert_eq!(sanitize_filename("", "pdf"), "document.pdf");
        assert_eq!(sanitize_filename(".hidden", "pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("$$$.pdf", "pdf"), "document.pdf");
    }

    #[test]
    fn sanitize_caps_stem_length() {
        let long = format!("{}.pdf", "a".repeat(300));
        let clean = sanitize_filename(&long, "pdf");
        assert_eq!(clean.len(), FILENAME_MAX_LEN + 4);
    }

    #[test]
    fn source_kind_from_mime_ignores_parameters() {
        assert_eq!(
            SourceKind::from_mime("application/pdf; charset=binary"),
            Some(SourceKind::Pdf)
        );
        assert_eq!(SourceKind::from_mime("image/png"), None);
    }

    #[test]
    fn input_extension_follows_filename_when_consistent() {
        let req = ConversionRequest::convert(vec![], SourceKind::Word, TargetFormat::Pdf, "a.doc");
        assert_eq!(req.input_extension(), "doc");
        let req = ConversionRequest::convert(vec![], SourceKind::Word, TargetFormat::Pdf, "a.bin");
        assert_eq!(req.input_extension(), "docx");
    }

    #[test]
    fn debug_redacts_password() {
        let req = ConversionRequest::protect(vec![], "s3cret!", "x.pdf").unwrap();
        let dbg = format!("{req:?}");
        assert!(!dbg.contains("s3cret"), "got: {dbg}");
    }

    #[test]
    fn image_heavy_by_size_per_page() {
        let mut p = DocumentProfile::fallback(0, 0);
        p.page_count = 5;
        p.bytes_per_page = IMAGE_HEAVY_BYTES_PER_PAGE + 1;
        assert!(p.is_image_heavy());
        p.bytes_per_page = 100_000;
        assert!(!p.is_image_heavy());
    }

    #[test]
    fn image_heavy_by_image_streams() {
        let p = DocumentProfile {
            page_count: 3,
            is_encrypted: false,
            is_scanned: true,
            has_complex_layout: false,
            bytes_per_page: 600 * 1024,
            image_streams: 3,
            is_fallback: false,
        };
        assert!(p.is_image_heavy());
    }

    #[test]
    fn quality_parse() {
        assert_eq!("LOW".parse::<Quality>().unwrap(), Quality::Low);
        assert_eq!("medium".parse::<Quality>().unwrap(), Quality::Moderate);
        assert!("ultra".parse::<Quality>().is_err());
    }
}
