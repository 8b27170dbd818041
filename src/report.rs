//! Turn a finished chain into bytes or one structured error.
//!
//! Callers never see raw tool stderr: diagnostics are collapsed to one
//! line, scratch paths are replaced by `<scratch>` and the text is capped.

use crate::error::{ConversionError, FailureCause};
use crate::model::{DocumentProfile, StrategyOutcome};
use crate::pipeline::chain::{ChainReport, Winner};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tool_probe::Tool;

/// Longest diagnostic handed to callers, in characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One line, no scratch paths, at most [`MAX_DIAGNOSTIC_CHARS`].
pub fn sanitize_diagnostic(raw: &str, scratch: &Path) -> String {
    let scratch = scratch.to_string_lossy();
    let scrubbed = if scratch.is_empty() {
        raw.to_string()
    } else {
        raw.replace(scratch.as_ref(), "<scratch>")
    };
    let line = RE_WHITESPACE.replace_all(scrubbed.trim(), " ");
    if line.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return line.into_owned();
    }
    let mut capped: String = line.chars().take(MAX_DIAGNOSTIC_CHARS - 1).collect();
    capped.push('…');
    capped
}

/// Profile-derived advice for an exhausted chain. Encryption wins over
/// scanning, scanning over layout.
pub fn profile_hint(profile: &DocumentProfile) -> Option<String> {
    if profile.is_fallback {
        return None;
    }
    if profile.is_encrypted {
        Some("PDF is password-protected; remove protection first".into())
    } else if profile.is_scanned {
        Some("this appears to be a scanned PDF; run OCR first".into())
    } else if profile.has_complex_layout {
        Some(format!(
            "complex layout ({} pages, forms or scripts) may not convert cleanly",
            profile.page_count
        ))
    } else {
        None
    }
}

/// Tools named by `tool_missing` outcomes, in chain order, deduplicated.
pub fn missing_tools(outcomes: &[StrategyOutcome]) -> Vec<Tool> {
    let mut tools = Vec::new();
    for outcome in outcomes {
        if let Some(FailureCause::ToolMissing { tool }) = outcome.cause {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
    }
    tools
}

/// True when every attempt failed only because its tool is not installed.
pub fn all_tools_missing(outcomes: &[StrategyOutcome]) -> bool {
    !outcomes.is_empty()
        && outcomes
            .iter()
            .all(|o| matches!(o.cause, Some(FailureCause::ToolMissing { .. })))
}

/// Whether a profile hint could change the error the caller sees.
pub fn wants_hint(report: &ChainReport) -> bool {
    report.winner.is_none() && !report.cancelled && !all_tools_missing(&report.outcomes)
}

/// Final decision for a chain: the winner, or the error it maps to.
pub fn finish(
    operation: &str,
    report: ChainReport,
    profile: Option<&DocumentProfile>,
) -> Result<(Winner, Vec<StrategyOutcome>), ConversionError> {
    let ChainReport {
        winner,
        outcomes,
        cancelled,
    } = report;

    if cancelled {
        return Err(ConversionError::Cancelled {
            operation: operation.to_string(),
        });
    }
    if let Some(winner) = winner {
        return Ok((winner, outcomes));
    }
    if all_tools_missing(&outcomes) {
        return Err(ConversionError::ToolUnavailable {
            operation: operation.to_string(),
            missing: missing_tools(&outcomes),
        });
    }

    let last = outcomes.last();
    Err(ConversionError::Exhausted {
        operation: operation.to_string(),
        attempts: outcomes.len(),
        last_diagnostic: last
            .map(|o| o.diagnostic.clone())
            .unwrap_or_else(|| "no strategy applies".to_string()),
        last_cause: last.and_then(|o| o.cause.clone()),
        hint: profile.and_then(profile_hint),
    })
}
