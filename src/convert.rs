//! Public entry points: [`Converter::convert`], [`Converter::compress`],
//! [`Converter::protect`] and [`Converter::inspect`].
//!
//! One call is one request:
//!
//! ```text
//! validate ─▶ workspace ─▶ (classify) ─▶ chain ─▶ report ─▶ cleanup
//! ```
//!
//! Request validation runs before anything touches the filesystem or a
//! tool. The workspace is swept on every exit path, including errors.

use crate::config::EngineConfig;
use crate::error::ConversionError;
use crate::model::{
    ConversionRequest, DocumentProfile, Operation, Quality, SourceKind, StrategyOutcome, TargetFormat,
};
use crate::pipeline::chain::ChainExecutor;
use crate::pipeline::classify::{Classifier, LazyProfile};
use crate::pipeline::runner::{CancelToken, ProcessRunner, TokioProcessRunner};
use crate::pipeline::validate;
use crate::pipeline::workspace::Workspace;
use crate::report;
use crate::strategy::remote::RemoteClient;
use crate::strategy::{self, StrategyContext};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tool_probe::{ResolvedTools, ToolStatus};
use tracing::{debug, info};

/// Result of a successful request, with the attempt history.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Id of the strategy that produced `bytes`.
    pub strategy: String,
    /// Every attempt, in chain order; the last one is the winner.
    pub attempts: Vec<StrategyOutcome>,
    /// Compression only: the candidate was not smaller, so `bytes` is the input.
    pub unchanged: bool,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub elapsed_ms: u64,
    /// Present when the request needed one (compression, or a hint on failure).
    pub profile: Option<DocumentProfile>,
}

/// The conversion engine. Cheap to share behind an `Arc`; each call owns
/// its own workspace.
pub struct Converter {
    config: EngineConfig,
    tools: ResolvedTools,
    runner: Arc<dyn ProcessRunner>,
    remote: Option<RemoteClient>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .field("remote", &self.remote.as_ref().map(|r| &r.config().base_url))
            .finish()
    }
}

impl Converter {
    /// Engine running real processes via `tokio::process`.
    pub fn new(config: EngineConfig) -> Result<Self, ConversionError> {
        let runner = Arc::new(TokioProcessRunner::new(config.max_tool_output_bytes));
        Self::with_runner(config, runner)
    }

    /// Engine with a custom [`ProcessRunner`] (sandboxing, tests).
    pub fn with_runner(config: EngineConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self, ConversionError> {
        let remote = match config.remote.clone() {
            Some(remote) => Some(
                RemoteClient::new(remote)
                    .map_err(|e| ConversionError::InvalidConfig(format!("remote HTTP client: {e}")))?,
            ),
            None => None,
        };
        let tools = config.tools.resolve_all();
        Ok(Self {
            config,
            tools,
            runner,
            remote,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Availability of every external tool, as resolved for this engine.
    pub fn tool_report(&self) -> Vec<ToolStatus> {
        self.config.tools.probe_all()
    }

    // ── Plain entry points ───────────────────────────────────────────────

    /// Office → PDF or PDF → DOCX/XLSX/PPTX.
    pub async fn convert(
        &self,
        bytes: impl Into<Vec<u8>>,
        source: SourceKind,
        target: TargetFormat,
    ) -> Result<Vec<u8>, ConversionError> {
        let name = format!("document.{}", source.default_extension());
        let request = ConversionRequest::convert(bytes, source, target, &name);
        Ok(self.run(&request, &CancelToken::new()).await?.bytes)
    }

    /// Shrink a PDF. Never returns something larger than the input.
    pub async fn compress(&self, bytes: impl Into<Vec<u8>>, quality: Quality) -> Result<Vec<u8>, ConversionError> {
        let request = ConversionRequest::compress(bytes, quality, "document.pdf");
        Ok(self.run(&request, &CancelToken::new()).await?.bytes)
    }

    /// Encrypt a PDF with `password` as both user and owner password.
    pub async fn protect(&self, bytes: impl Into<Vec<u8>>, password: &str) -> Result<Vec<u8>, ConversionError> {
        let request = ConversionRequest::protect(bytes, password, "document.pdf")?;
        Ok(self.run(&request, &CancelToken::new()).await?.bytes)
    }

    /// Classify a PDF without converting it.
    pub async fn inspect(&self, bytes: &[u8]) -> Result<DocumentProfile, ConversionError> {
        self.check_size(bytes)?;
        validate::check_input(bytes, SourceKind::Pdf).map_err(ConversionError::Validation)?;

        let ws = Workspace::create(&self.config.scratch_dir).await?;
        let result = self.classify_in(&ws, bytes).await;
        ws.close().await;
        result
    }

    async fn classify_in(&self, ws: &Workspace, bytes: &[u8]) -> Result<DocumentProfile, ConversionError> {
        let input = ws.write_input(bytes, "pdf").await?;
        let classifier = Classifier::new(self.runner.as_ref(), &self.tools, self.config.timeouts.classify);
        Ok(classifier.classify(&input, bytes, &CancelToken::new()).await)
    }

    // ── Detailed entry point ─────────────────────────────────────────────

    /// Run one request to completion or cancellation.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancelToken,
    ) -> Result<ConversionOutput, ConversionError> {
        let started = Instant::now();
        let operation = request.describe();
        info!(
            "Starting {}: '{}' ({} bytes)",
            operation,
            request.original_filename(),
            request.source_bytes().len()
        );

        self.validate_request(request)?;
        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled { operation });
        }

        let ws = Workspace::create(&self.config.scratch_dir).await?;
        let result = self.run_in(&ws, request, cancel).await;
        ws.close().await;

        let mut output = result?;
        output.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "{} done via {} in {}ms ({} → {} bytes{})",
            operation,
            output.strategy,
            output.elapsed_ms,
            output.input_bytes,
            output.output_bytes,
            if output.unchanged { ", unchanged" } else { "" }
        );
        Ok(output)
    }

    fn check_size(&self, bytes: &[u8]) -> Result<(), ConversionError> {
        if bytes.len() > self.config.max_input_bytes {
            return Err(ConversionError::validation(format!(
                "input is {} bytes, larger than the {}-byte limit",
                bytes.len(),
                self.config.max_input_bytes
            )));
        }
        Ok(())
    }

    /// Everything that can be rejected without running a tool.
    fn validate_request(&self, request: &ConversionRequest) -> Result<(), ConversionError> {
        self.check_size(request.source_bytes())?;
        validate::check_input(request.source_bytes(), request.source_kind()).map_err(ConversionError::Validation)?;
        // Unsupported (source, target) pairs fail here rather than after upload.
        strategy::chain_for(request, None, &self.config)?;
        Ok(())
    }

    async fn run_in(
        &self,
        ws: &Workspace,
        request: &ConversionRequest,
        cancel: &CancelToken,
    ) -> Result<ConversionOutput, ConversionError> {
        let source = request.source_bytes();
        let input = ws.write_input(source, request.input_extension()).await?;

        let classifier = Classifier::new(self.runner.as_ref(), &self.tools, self.config.timeouts.classify);
        let profile = LazyProfile::new();
        let classify = || classifier.classify(&input, source, cancel);

        // Compression branches on the profile before the chain starts.
        if matches!(request.operation(), Operation::Compress { .. }) {
            profile.get_or_classify(classify).await;
        }
        let strategies = strategy::chain_for(request, profile.get(), &self.config)?;
        debug!(
            "chain: {}",
            strategies.iter().map(|s| s.id).collect::<Vec<_>>().join(" → ")
        );

        let ctx = StrategyContext {
            request,
            workspace: ws,
            input: &input,
            tools: &self.tools,
        };
        let chain_report = ChainExecutor::new(self.runner.as_ref(), cancel)
            .with_remote(self.remote.as_ref())
            .with_progress(self.config.progress_callback.as_ref())
            .execute(&ctx, &strategies)
            .await;

        if report::wants_hint(&chain_report) && request.source_kind() == SourceKind::Pdf {
            profile.get_or_classify(classify).await;
        }
        let (winner, attempts) = report::finish(&request.describe(), chain_report, profile.get())?;

        let mut bytes = winner.bytes;
        let mut unchanged = false;
        if matches!(request.operation(), Operation::Compress { .. }) && bytes.len() >= source.len() {
            info!(
                "{} produced {} bytes from {}; keeping the original",
                winner.strategy_id,
                bytes.len(),
                source.len()
            );
            bytes = source.to_vec();
            unchanged = true;
        }

        Ok(ConversionOutput {
            input_bytes: source.len(),
            output_bytes: bytes.len(),
            bytes,
            strategy: winner.strategy_id.to_string(),
            attempts,
            unchanged,
            elapsed_ms: 0,
            profile: profile.get().cloned(),
        })
    }
}

/// Write `bytes` to `path` atomically (temp file in the same directory, then rename).
pub async fn write_output(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), ConversionError> {
    let path = path.as_ref();
    let write_err = |source| ConversionError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}
