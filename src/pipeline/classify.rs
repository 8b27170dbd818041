//! Document classifier: a heuristic [`DocumentProfile`] from `pdfinfo` and `pdftotext`.
//!
//! Classification is best-effort. A missing tool, a timeout or unparseable
//! output yields [`DocumentProfile::fallback`] instead of an error, so a
//! broken metadata tool never blocks a conversion.
//!
//! ## Heuristics
//!
//! | Flag | Rule |
//! |------|------|
//! | `is_encrypted` | `Encrypted:` is anything but `no`, or pdfinfo asks for a password |
//! | `is_scanned` | the first pages yield no text, or the file is untagged and text extraction is unavailable |
//! | `has_complex_layout` | more than 10 pages, an AcroForm/XFA form, or JavaScript |
//! | `bytes_per_page` | input size / page count |

use crate::error::ProcessError;
use crate::model::DocumentProfile;
use crate::pipeline::runner::{CancelToken, Invocation, ProcessRunner};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tool_probe::{ResolvedTools, Tool};
use tracing::{debug, warn};

/// Page count above which a layout is treated as complex.
const COMPLEX_PAGE_THRESHOLD: u32 = 10;

/// Pages fed to the text probe; enough to tell a text layer from none.
const TEXT_PROBE_PAGES: &str = "3";

static RE_IMAGE_XOBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Subtype\s*/Image").unwrap());

/// Fields pulled out of `pdfinfo` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    pub pages: Option<u32>,
    pub encrypted: bool,
    pub tagged: bool,
    pub has_form: bool,
    pub has_javascript: bool,
}

/// Parse `Key: value` lines as printed by poppler's `pdfinfo`.
pub fn parse_pdfinfo(output: &str) -> PdfInfo {
    let mut info = PdfInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_ascii_lowercase();
        match key.trim() {
            "Pages" => info.pages = value.parse().ok(),
            "Encrypted" => info.encrypted = !(value.is_empty() || value == "no" || value == "none"),
            "Tagged" => info.tagged = value == "yes",
            "Form" => info.has_form = !(value.is_empty() || value == "none"),
            "JavaScript" => info.has_javascript = value == "yes",
            _ => {}
        }
    }
    info
}

/// Count image XObjects visible in the raw bytes (uncompressed dictionaries only).
pub fn count_image_streams(bytes: &[u8]) -> usize {
    RE_IMAGE_XOBJECT.find_iter(bytes).count()
}

/// Combine metadata and text-probe results into a profile.
///
/// `text` is `None` when text extraction itself failed.
pub fn build_profile(info: &PdfInfo, text: Option<&str>, byte_len: usize, image_streams: usize) -> DocumentProfile {
    let page_count = info.pages.unwrap_or(1).max(1);
    let no_text = match text {
        Some(t) => t.trim().is_empty(),
        None => !info.tagged,
    };
    DocumentProfile {
        page_count,
        is_encrypted: info.encrypted,
        // An encrypted file without the password yields no text either.
        is_scanned: no_text && !info.encrypted,
        has_complex_layout: page_count > COMPLEX_PAGE_THRESHOLD || info.has_form || info.has_javascript,
        bytes_per_page: byte_len as u64 / page_count as u64,
        image_streams,
        is_fallback: false,
    }
}

/// Runs the metadata and text probes through a [`ProcessRunner`].
pub struct Classifier<'a> {
    runner: &'a dyn ProcessRunner,
    tools: &'a ResolvedTools,
    timeout: Duration,
}

impl<'a> Classifier<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, tools: &'a ResolvedTools, timeout: Duration) -> Self {
        Self { runner, tools, timeout }
    }

    /// Profile the PDF at `path` (whose contents are `bytes`). Never fails.
    pub async fn classify(&self, path: &Path, bytes: &[u8], cancel: &CancelToken) -> DocumentProfile {
        let image_streams = count_image_streams(bytes);

        let info_inv = Invocation::new(Tool::Pdfinfo, self.tools.program(Tool::Pdfinfo), self.timeout)
            .arg(path.as_os_str());
        let info = match self.runner.run(&info_inv, cancel).await {
            Ok(out) => parse_pdfinfo(&out.stdout_text()),
            Err(ProcessError::NonZeroExit { stderr, .. }) if stderr.to_ascii_lowercase().contains("password") => {
                debug!("pdfinfo reports a password-protected PDF");
                PdfInfo {
                    encrypted: true,
                    ..PdfInfo::default()
                }
            }
            Err(e) => {
                warn!("classification skipped, using defaults: {}", e);
                return DocumentProfile::fallback(bytes.len(), image_streams);
            }
        };

        let text = if info.encrypted {
            None
        } else {
            let text_inv = Invocation::new(Tool::Pdftotext, self.tools.program(Tool::Pdftotext), self.timeout)
                .args(["-l", TEXT_PROBE_PAGES, "-enc", "UTF-8", "-q"])
                .arg(path.as_os_str())
                .arg("-");
            match self.runner.run(&text_inv, cancel).await {
                Ok(out) => Some(out.stdout_text()),
                Err(e) => {
                    debug!("text probe unavailable: {}", e);
                    None
                }
            }
        };

        let profile = build_profile(&info, text.as_deref(), bytes.len(), image_streams);
        debug!(
            "profile: {} page(s), encrypted={}, scanned={}, complex={}, {} B/page, {} image(s)",
            profile.page_count,
            profile.is_encrypted,
            profile.is_scanned,
            profile.has_complex_layout,
            profile.bytes_per_page,
            profile.image_streams
        );
        profile
    }
}

/// A profile computed on first need and cached for the rest of the request.
#[derive(Debug, Default)]
pub struct LazyProfile {
    cell: OnceCell<DocumentProfile>,
}

impl LazyProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&DocumentProfile> {
        self.cell.get()
    }

    pub async fn get_or_classify<F, Fut>(&self, classify: F) -> &DocumentProfile
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DocumentProfile>,
    {
        self.cell.get_or_init(classify).await
    }
}
