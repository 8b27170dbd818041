//! Source loading: read a user-supplied path or URL into memory.
//!
//! The engine itself only ever sees byte buffers. This module is the
//! collaborator the CLI uses to get those bytes, either from the local
//! filesystem or over HTTP(S).

use crate::error::ConversionError;
use crate::model::sanitize_filename;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// A document loaded into memory, ready to become a [`crate::ConversionRequest`].
#[derive(Clone)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    /// Sanitised file name (no directories).
    pub filename: String,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("filename", &self.filename)
            .finish()
    }
}

impl SourceDocument {
    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a document from a local path or an HTTP(S) URL.
///
/// `max_bytes` bounds both the local file size and the download size.
pub async fn load_source(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<SourceDocument, ConversionError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        load_local(input, max_bytes).await
    }
}

async fn load_local(path_str: &str, max_bytes: usize) -> Result<SourceDocument, ConversionError> {
    let path = PathBuf::from(path_str);

    let meta = tokio::fs::metadata(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ConversionError::PermissionDenied { path: path.clone() },
        _ => ConversionError::FileNotFound { path: path.clone() },
    })?;
    if !meta.is_file() {
        return Err(ConversionError::FileNotFound { path });
    }
    if meta.len() > max_bytes as u64 {
        return Err(too_large(meta.len(), max_bytes));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ConversionError::PermissionDenied { path: path.clone() }
        } else {
            ConversionError::FileNotFound { path: path.clone() }
        }
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!("Loaded local source: {} ({} bytes)", path.display(), bytes.len());
    Ok(SourceDocument {
        bytes,
        filename: sanitize_filename(&name, "bin"),
    })
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<SourceDocument, ConversionError> {
    info!("Downloading source from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ConversionError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send = |e: reqwest::Error| {
        if e.is_timeout() {
            ConversionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ConversionError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send)?;

    if !response.status().is_success() {
        return Err(ConversionError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            return Err(too_large(len, max_bytes));
        }
    }

    let filename = filename_from_url(url);
    let bytes = response.bytes().await.map_err(map_send)?;
    if bytes.len() > max_bytes {
        return Err(too_large(bytes.len() as u64, max_bytes));
    }

    info!("Downloaded {} bytes as '{}'", bytes.len(), filename);
    Ok(SourceDocument {
        bytes: bytes.to_vec(),
        filename,
    })
}

/// Extract a reasonable file name from the URL path.
fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });
    match last {
        Some(name) if !name.is_empty() && name.contains('.') => sanitize_filename(&name, "bin"),
        _ => "downloaded.bin".to_string(),
    }
}

fn too_large(len: u64, max: usize) -> ConversionError {
    ConversionError::validation(format!(
        "input is {len} bytes, larger than the {max}-byte limit"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/a/report.pdf"), "report.pdf");
        assert_eq!(filename_from_url("https://x.org/a/b/"), "downloaded.bin");
        assert_eq!(
            filename_from_url("https://x.org/files/my%20deck.pptx"),
            "my_20deck.pptx"
        );
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = load_source("/definitely/not/here.pdf", 5, 1024).await.unwrap_err();
        assert!(matches!(err, ConversionError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![b'x'; 2048]).unwrap();
        let err = load_source(path.to_str().unwrap(), 5, 1024).await.unwrap_err();
        assert!(matches!(err, ConversionError::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn local_file_loads_with_sanitised_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Quarterly Report.docx");
        std::fs::write(&path, b"PK\x03\x04rest").unwrap();
        let doc = load_source(path.to_str().unwrap(), 5, 1024).await.unwrap();
        assert_eq!(doc.filename, "Quarterly_Report.docx");
        assert_eq!(doc.extension().as_deref(), Some("docx"));
        assert_eq!(doc.bytes.len(), 8);
    }
}
