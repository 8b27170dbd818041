//! Output and input validation by size and magic bytes.
//!
//! Everything here is a pure function over a byte slice. No filesystem
//! access, no allocation beyond the occasional reason string.

use crate::model::{SourceKind, TargetFormat};

/// Smallest artifact any strategy may return.
pub const MIN_OUTPUT_BYTES: usize = 100;

/// How far into an input the `%PDF` header may appear.
///
/// Some producers prepend junk (a BOM, an HTTP header fragment) before it.
const PDF_HEADER_WINDOW: usize = 1024;

const PDF_MAGIC: &[u8] = b"%PDF";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const RTF_MAGIC: &[u8] = b"{\\rtf";

/// True when `bytes` is at least [`MIN_OUTPUT_BYTES`] long and carries the
/// signature of `target`.
pub fn validate(bytes: &[u8], target: TargetFormat) -> bool {
    check(bytes, target, MIN_OUTPUT_BYTES).is_ok()
}

/// Like [`validate`], but keyed by file extension. Unknown extensions skip
/// the signature check; the size floor still applies.
pub fn validate_for_extension(bytes: &[u8], ext: &str) -> bool {
    if bytes.len() < MIN_OUTPUT_BYTES {
        return false;
    }
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "pdf" => has_pdf_signature(bytes),
        "docx" | "xlsx" | "pptx" => has_zip_signature(bytes),
        _ => true,
    }
}

/// Size and signature check with a reason suitable for a diagnostic.
pub fn check(bytes: &[u8], target: TargetFormat, min_bytes: usize) -> Result<(), String> {
    let min = min_bytes.max(MIN_OUTPUT_BYTES);
    if bytes.len() < min {
        return Err(format!("{} bytes is below the {min}-byte minimum", bytes.len()));
    }
    check_signature(bytes, target)
}

/// Signature check alone.
pub fn check_signature(bytes: &[u8], target: TargetFormat) -> Result<(), String> {
    let ok = match target {
        TargetFormat::Pdf => has_pdf_signature(bytes),
        TargetFormat::Docx | TargetFormat::Xlsx | TargetFormat::Pptx => has_zip_signature(bytes),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("missing {} signature", target.extension().to_uppercase()))
    }
}

pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// `PK` followed by a local-file, central-directory, end or spanning marker.
pub fn has_zip_signature(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some([b'P', b'K', 3, 4]) | Some([b'P', b'K', 1, 2]) | Some([b'P', b'K', 5, 6]) | Some([b'P', b'K', 7, 8])
    )
}

/// True when the PDF declares an encryption dictionary.
pub fn looks_encrypted(bytes: &[u8]) -> bool {
    contains(bytes, b"/Encrypt")
}

/// `%PDF` within the first kilobyte.
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    contains(window, PDF_MAGIC)
}

/// OOXML (ZIP), legacy OLE compound file, or RTF.
pub fn is_office_container(bytes: &[u8]) -> bool {
    has_zip_signature(bytes) || bytes.starts_with(OLE_MAGIC) || bytes.starts_with(RTF_MAGIC)
}

/// Reject inputs that cannot be what the caller declared.
pub fn check_input(bytes: &[u8], kind: SourceKind) -> Result<(), String> {
    if bytes.is_empty() {
        return Err("input is empty".into());
    }
    match kind {
        SourceKind::Pdf if !has_pdf_header(bytes) => {
            Err("input is not a PDF (no %PDF header in the first 1024 bytes)".into())
        }
        SourceKind::Word | SourceKind::Excel | SourceKind::PowerPoint if !is_office_container(bytes) => {
            Err(format!("input is not a {kind} document (unrecognised container)"))
        }
        _ => Ok(()),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
