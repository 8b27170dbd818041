//! Error types for the docshift library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConversionError`] is **fatal**: the operation cannot produce a result
//!   (bad input, every strategy exhausted, required tools missing). Returned
//!   as `Err(ConversionError)` from the public [`crate::Converter`] methods.
//!
//! * [`FailureCause`] is **non-fatal**: one strategy in a chain failed (tool
//!   timed out, output rejected). Stored inside
//!   [`crate::model::StrategyOutcome`]; the chain moves on to the next
//!   strategy and the cause only reaches the caller as part of an
//!   exhaustion report.
//!
//! [`ProcessError`] is the narrower vocabulary of the process-runner
//! boundary; the chain executor folds it into a `FailureCause`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tool_probe::Tool;

/// Stable, serialisable classification of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or parameters; retrying will not help.
    Validation,
    /// An external binary needed for the operation is not installed.
    ToolUnavailable,
    /// Every strategy in the chain failed.
    Exhausted,
    /// The caller cancelled the operation.
    Cancelled,
    /// Local I/O failure (scratch directory, output file, download).
    Io,
}

/// All fatal errors returned by the docshift library.
///
/// Per-strategy failures use [`FailureCause`] and are carried in
/// [`crate::model::StrategyOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request itself is invalid (empty input, bad password, wrong type).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Chain errors ──────────────────────────────────────────────────────
    /// Every strategy failed because the tools they need are not installed.
    #[error("{operation} needs tools that are not installed: {}.\n{}", display_tools(.missing), install_hints(.missing))]
    ToolUnavailable { operation: String, missing: Vec<Tool> },

    /// Every strategy was tried and none produced a valid result.
    #[error("{operation} failed after {attempts} attempt(s). Last error: {last_diagnostic}{}", hint_suffix(.hint))]
    Exhausted {
        operation: String,
        attempts: usize,
        last_diagnostic: String,
        last_cause: Option<FailureCause>,
        hint: Option<String>,
    },

    /// The caller's cancellation token fired.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The scratch directory could not be created or written.
    #[error("Scratch directory '{path}' is not usable: {source}\nSet DOCSHIFT_SCRATCH_DIR to a writable directory.")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ConversionError {
    /// Coarse classification for callers mapping errors to status codes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::Validation(_)
            | ConversionError::FileNotFound { .. }
            | ConversionError::PermissionDenied { .. }
            | ConversionError::InvalidConfig(_) => ErrorKind::Validation,
            ConversionError::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            ConversionError::Exhausted { .. } => ErrorKind::Exhausted,
            ConversionError::Cancelled { .. } => ErrorKind::Cancelled,
            ConversionError::DownloadFailed { .. }
            | ConversionError::DownloadTimeout { .. }
            | ConversionError::Scratch { .. }
            | ConversionError::OutputWriteFailed { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ConversionError::Validation(msg.into())
    }
}

fn display_tools(tools: &[Tool]) -> String {
    tools
        .iter()
        .map(|t| t.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn install_hints(tools: &[Tool]) -> String {
    let mut hints: Vec<String> = Vec::with_capacity(tools.len());
    for t in tools {
        let hint = format!("  • {} (or set {})", t.install_hint(), t.env_var());
        if !hints.contains(&hint) {
            hints.push(hint);
        }
    }
    hints.join("\n")
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\nHint: {h}"),
        None => String::new(),
    }
}

/// Why a single strategy attempt failed.
///
/// Never returned on its own from the public API: the chain records it in a
/// [`crate::model::StrategyOutcome`] and continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    /// The strategy's binary is not installed.
    #[error("{} is not installed", .tool.display_name())]
    ToolMissing {
        #[serde(with = "tool_serde")]
        tool: Tool,
    },

    /// The strategy exceeded its time budget.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The tool ran but reported an error.
    #[error("{detail}")]
    ToolError { detail: String },

    /// The tool exited cleanly but no output file appeared.
    #[error("no output produced")]
    NoOutput,

    /// Output was produced but failed size/signature checks.
    #[error("output rejected: {reason}")]
    InvalidOutput { reason: String },

    /// The remote conversion server failed or refused the job.
    #[error("remote conversion failed: {detail}")]
    RemoteError { detail: String },
}

mod tool_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use tool_probe::Tool;

    pub fn serialize<S: Serializer>(tool: &Tool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(tool.id())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Tool, D::Error> {
        let id = String::deserialize(d)?;
        Tool::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown tool '{id}'")))
    }
}

/// Failures at the process-runner boundary.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The binary could not be spawned because it does not exist.
    #[error("{program}: command not found")]
    NotFound { program: String },

    /// The process outlived its timeout and was killed.
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// The process exited unsuccessfully.
    #[error("{program} exited with status {code:?}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The caller's cancellation token fired while the process was running.
    #[error("{program} was cancelled")]
    Cancelled { program: String },

    /// Spawning or waiting failed for another reason.
    #[error("{program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_unavailable_names_every_tool() {
        let e = ConversionError::ToolUnavailable {
            operation: "PDF protection".into(),
            missing: vec![Tool::Qpdf, Tool::Pdftk],
        };
        let msg = e.to_string();
        assert!(msg.contains("qpdf"), "got: {msg}");
        assert!(msg.contains("pdftk"), "got: {msg}");
        assert!(msg.contains("DOCSHIFT_QPDF"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::ToolUnavailable);
    }

    #[test]
    fn install_hints_are_listed_once() {
        let hints = install_hints(&[Tool::Qpdf, Tool::Pdftk, Tool::Qpdf]);
        assert_eq!(hints.lines().count(), 2, "got: {hints}");
        assert_eq!(hints.matches("DOCSHIFT_QPDF").count(), 1);
    }

    #[test]
    fn exhausted_display_with_hint() {
        let e = ConversionError::Exhausted {
            operation: "PDF → DOCX".into(),
            attempts: 4,
            last_diagnostic: "soffice exited with status Some(1)".into(),
            last_cause: None,
            hint: Some("PDF is password-protected; remove protection first".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("4 attempt(s)"), "got: {msg}");
        assert!(msg.contains("Hint: PDF is password-protected"), "got: {msg}");
    }

    #[test]
    fn exhausted_display_without_hint() {
        let e = ConversionError::Exhausted {
            operation: "PDF compression".into(),
            attempts: 2,
            last_diagnostic: "timed out after 120s".into(),
            last_cause: Some(FailureCause::Timeout { secs: 120 }),
            hint: None,
        };
        assert!(!e.to_string().contains("Hint"));
    }

    #[test]
    fn validation_kind() {
        assert_eq!(
            ConversionError::validation("empty input").kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn failure_cause_serialises_tool_id() {
        let cause = FailureCause::ToolMissing { tool: Tool::Ghostscript };
        let json = serde_json::to_string(&cause).unwrap();
        assert_eq!(json, r#"{"cause":"tool_missing","tool":"gs"}"#);
        let back: FailureCause = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cause);
    }
}
