//! Strategy chain executor.
//!
//! Runs strategies strictly in order, one at a time, and stops at the first
//! output that passes validation. Every per-strategy failure (missing tool,
//! timeout, bad exit, no output, rejected output) is recorded as a
//! [`StrategyOutcome`] and swallowed; only the final [`ChainReport`] leaves
//! this module. Turning that report into an error is [`crate::report`]'s job.

use crate::error::{FailureCause, ProcessError};
use crate::model::{OutcomeStatus, StrategyOutcome, TargetFormat};
use crate::pipeline::runner::{CancelToken, Invocation, ProcessOutput, ProcessRunner};
use crate::pipeline::validate;
use crate::progress::ProgressCallback;
use crate::report::sanitize_diagnostic;
use crate::strategy::remote::RemoteClient;
use crate::strategy::{ooxml, Plan, SignatureCheck, Strategy, StrategyContext};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The output that ended the chain.
#[derive(Debug, Clone)]
pub struct Winner {
    pub strategy_id: &'static str,
    pub bytes: Vec<u8>,
}

/// Everything the executor learned while running a chain.
#[derive(Debug, Default)]
pub struct ChainReport {
    pub winner: Option<Winner>,
    /// One entry per attempted strategy, in order.
    pub outcomes: Vec<StrategyOutcome>,
    /// The cancellation token fired; the chain stopped early.
    pub cancelled: bool,
}

/// A validated output, with an optional note for the outcome record.
struct Produced {
    bytes: Vec<u8>,
    note: Option<String>,
}

enum Failure {
    Cancelled,
    Cause(FailureCause),
    /// Output was read back (this many bytes) but failed validation.
    Rejected(FailureCause, usize),
}

impl From<FailureCause> for Failure {
    fn from(cause: FailureCause) -> Self {
        Failure::Cause(cause)
    }
}

/// Sequential, first-success-wins executor.
pub struct ChainExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    cancel: &'a CancelToken,
    remote: Option<&'a RemoteClient>,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> ChainExecutor<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, cancel: &'a CancelToken) -> Self {
        Self {
            runner,
            cancel,
            remote: None,
            progress: None,
        }
    }

    pub fn with_remote(mut self, remote: Option<&'a RemoteClient>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_progress(mut self, progress: Option<&'a ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn execute(&self, ctx: &StrategyContext<'_>, strategies: &[Strategy]) -> ChainReport {
        let operation = ctx.request.describe();
        let total = strategies.len();
        let mut report = ChainReport::default();
        info!("{}: {} strateg{} to try", operation, total, if total == 1 { "y" } else { "ies" });
        if let Some(cb) = self.progress {
            cb.on_chain_start(&operation, total);
        }

        for (i, strategy) in strategies.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Some(cb) = self.progress {
                cb.on_strategy_start(i + 1, total, strategy.id);
            }

            let started = Instant::now();
            let result = self.attempt(ctx, strategy).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(Produced { bytes, note }) => {
                    info!("{} succeeded ({} bytes, {}ms)", strategy.id, bytes.len(), duration_ms);
                    if let Some(cb) = self.progress {
                        cb.on_strategy_success(strategy.id, bytes.len());
                    }
                    report.outcomes.push(StrategyOutcome {
                        strategy_id: strategy.id.to_string(),
                        status: OutcomeStatus::Success,
                        produced_bytes: Some(bytes.len()),
                        diagnostic: note.unwrap_or_default(),
                        cause: None,
                        duration_ms,
                    });
                    report.winner = Some(Winner {
                        strategy_id: strategy.id,
                        bytes,
                    });
                    break;
                }
                Err(Failure::Cancelled) => {
                    info!("{} cancelled", strategy.id);
                    report.cancelled = true;
                    break;
                }
                Err(Failure::Cause(cause)) => {
                    report.outcomes.push(self.failed(ctx, strategy, cause, None, duration_ms));
                }
                Err(Failure::Rejected(cause, len)) => {
                    report.outcomes.push(self.failed(ctx, strategy, cause, Some(len), duration_ms));
                }
            }
        }

        if let Some(cb) = self.progress {
            cb.on_chain_complete(report.winner.is_some(), report.outcomes.len());
        }
        report
    }

    fn failed(
        &self,
        ctx: &StrategyContext<'_>,
        strategy: &Strategy,
        cause: FailureCause,
        produced_bytes: Option<usize>,
        duration_ms: u64,
    ) -> StrategyOutcome {
        let diagnostic = sanitize_diagnostic(&cause.to_string(), ctx.workspace.dir());
        warn!("{} failed: {}", strategy.id, diagnostic);
        if let Some(cb) = self.progress {
            cb.on_strategy_failed(strategy.id, &diagnostic);
        }
        StrategyOutcome {
            strategy_id: strategy.id.to_string(),
            status: status_for(&cause),
            produced_bytes,
            diagnostic,
            cause: Some(sanitized_cause(cause, ctx)),
            duration_ms,
        }
    }

    async fn attempt(&self, ctx: &StrategyContext<'_>, strategy: &Strategy) -> Result<Produced, Failure> {
        let target = ctx.request.target_format();
        let mut note = None;
        let bytes = match strategy.plan(ctx) {
            Plan::Process { invocation, outputs } => {
                // Leftovers from an earlier attempt must not pass as this one's output.
                for path in &outputs {
                    ctx.workspace.remove(path).await;
                }
                self.run(&invocation).await?;
                let Some(path) = first_existing(&outputs).await else {
                    return Err(FailureCause::NoOutput.into());
                };
                let bytes = tokio::fs::read(&path).await.map_err(|e| FailureCause::ToolError {
                    detail: format!("could not read {}: {e}", path.display()),
                })?;
                ctx.workspace.remove(&path).await;
                bytes
            }
            Plan::ExtractText { invocation, target } => {
                let out = self.run(&invocation).await?;
                if out.stdout_truncated {
                    let msg = format!("extracted text truncated at {} bytes", out.stdout.len());
                    warn!("{}: {}", strategy.id, msg);
                    note = Some(msg);
                }
                ooxml::package_text(&out.stdout_text(), target)?
            }
            Plan::Remote => {
                let Some(remote) = self.remote else {
                    return Err(FailureCause::RemoteError {
                        detail: "no remote server configured".into(),
                    }
                    .into());
                };
                let request = ctx.request;
                let job = remote.convert(
                    request.source_bytes(),
                    request.original_filename(),
                    ctx.workspace.token(),
                    target,
                );
                // Per-call HTTP timeouts do not bound retries and backoff; this does.
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(Failure::Cancelled),
                    res = tokio::time::timeout(strategy.timeout, job) => match res {
                        Ok(res) => res?,
                        Err(_) => {
                            return Err(FailureCause::Timeout {
                                secs: strategy.timeout.as_secs(),
                            }
                            .into())
                        }
                    },
                }
            }
        };

        check_output(strategy, &bytes, target).map_err(|cause| Failure::Rejected(cause, bytes.len()))?;
        Ok(Produced { bytes, note })
    }

    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, Failure> {
        self.runner
            .run(invocation, self.cancel)
            .await
            .map_err(|e| failure_from(e, invocation))
    }
}

/// Size floor, signature and (for protection) encryption marker.
fn check_output(strategy: &Strategy, bytes: &[u8], target: TargetFormat) -> Result<(), FailureCause> {
    let floor = strategy.min_output_bytes.max(validate::MIN_OUTPUT_BYTES);
    if bytes.len() < floor {
        return Err(FailureCause::InvalidOutput {
            reason: format!("{} bytes is below the {floor}-byte minimum", bytes.len()),
        });
    }
    if let Err(reason) = validate::check_signature(bytes, target) {
        match strategy.signature {
            SignatureCheck::Enforced => return Err(FailureCause::InvalidOutput { reason }),
            SignatureCheck::Advisory => warn!("{}: {} (accepted)", strategy.id, reason),
        }
    }
    if strategy.require_encryption && !validate::looks_encrypted(bytes) {
        return Err(FailureCause::InvalidOutput {
            reason: "output carries no encryption dictionary".into(),
        });
    }
    Ok(())
}

fn failure_from(err: ProcessError, invocation: &Invocation) -> Failure {
    match err {
        ProcessError::NotFound { .. } => Failure::Cause(FailureCause::ToolMissing { tool: invocation.tool }),
        ProcessError::Timeout { timeout, .. } => Failure::Cause(FailureCause::Timeout {
            secs: timeout.as_secs(),
        }),
        ProcessError::Cancelled { .. } => Failure::Cancelled,
        ProcessError::NonZeroExit { program, code, stderr } => {
            debug!("{} stderr:\n{}", program, stderr);
            let first_line = stderr.lines().map(str::trim).find(|l| !l.is_empty());
            let status = code.map_or_else(|| "was killed".to_string(), |c| format!("exited with code {c}"));
            let detail = match first_line {
                Some(line) => format!("{program} {status}: {line}"),
                None => format!("{program} {status}"),
            };
            Failure::Cause(FailureCause::ToolError { detail })
        }
        ProcessError::Io { program, source } => Failure::Cause(FailureCause::ToolError {
            detail: format!("{program}: {source}"),
        }),
    }
}

/// Scrub scratch paths out of the free-text parts of a cause.
fn sanitized_cause(cause: FailureCause, ctx: &StrategyContext<'_>) -> FailureCause {
    let scrub = |s: String| sanitize_diagnostic(&s, ctx.workspace.dir());
    match cause {
        FailureCause::ToolError { detail } => FailureCause::ToolError { detail: scrub(detail) },
        FailureCause::RemoteError { detail } => FailureCause::RemoteError { detail: scrub(detail) },
        FailureCause::InvalidOutput { reason } => FailureCause::InvalidOutput { reason: scrub(reason) },
        other => other,
    }
}

fn status_for(cause: &FailureCause) -> OutcomeStatus {
    match cause {
        FailureCause::Timeout { .. } => OutcomeStatus::Timeout,
        FailureCause::InvalidOutput { .. } => OutcomeStatus::RejectedInvalidOutput,
        _ => OutcomeStatus::ToolError,
    }
}

async fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    for path in candidates {
        if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
            return Some(path.clone());
        }
    }
    None
}
