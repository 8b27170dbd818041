//! Configuration for the conversion engine.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. One struct holds every knob: where scratch files
//! go, which binaries to run, how long each strategy family may take, and
//! whether a remote conversion server is in play.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tool_probe::{Tool, ToolPaths};

/// Configuration for a [`crate::Converter`].
///
/// Built via [`EngineConfig::builder()`], [`EngineConfig::from_env()`] or
/// [`EngineConfig::default()`].
///
/// # Example
/// ```rust
/// use docshift::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .scratch_dir("/tmp/docshift-test")
///     .office_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Shared scratch directory. Default: `$TMPDIR/docshift`.
    ///
    /// Requests partition it by a unique token embedded in every file name,
    /// so several engines (or processes) may share one directory.
    pub scratch_dir: PathBuf,

    /// Program overrides for the external tools. Default: `PATH` lookup.
    pub tools: ToolPaths,

    /// Remote conversion server, tried first for PDF → Office. Default: none.
    pub remote: Option<RemoteServerConfig>,

    /// Largest accepted input in bytes. Default: 100 MiB.
    pub max_input_bytes: usize,

    /// Cap on captured stdout/stderr per tool invocation. Default: 16 MiB.
    ///
    /// Text extraction of a large PDF goes through stdout, so this must stay
    /// well above typical document text sizes.
    pub max_tool_output_bytes: usize,

    /// Per-family time budgets.
    pub timeouts: Timeouts,

    /// Receives chain events (strategy started/failed/succeeded).
    pub progress_callback: Option<ProgressCallback>,
}

/// Time budgets for each strategy family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Metadata / text-extraction probes. Default: 30 s.
    pub classify: Duration,
    /// Office-suite conversions. Default: 120 s.
    pub office: Duration,
    /// Script-based PDF → Office converters. Default: 180 s.
    pub script: Duration,
    /// Text-based PDF compression. Default: 120 s.
    pub compress: Duration,
    /// Image-heavy PDF compression. Default: 300 s.
    pub compress_image_heavy: Duration,
    /// Encryption tools. Default: 60 s.
    pub protect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            classify: Duration::from_secs(30),
            office: Duration::from_secs(120),
            script: Duration::from_secs(180),
            compress: Duration::from_secs(120),
            compress_image_heavy: Duration::from_secs(300),
            protect: Duration::from_secs(60),
        }
    }
}

/// Settings for the remote document-conversion server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServerConfig {
    /// Base URL, e.g. `http://docserver:8000`. `/upload` and
    /// `/ConvertService` are resolved against it.
    pub base_url: String,

    /// Public base URL under which the caller serves uploaded sources.
    ///
    /// Used only when the direct upload fails: the job then references
    /// `{callback_base_url}/{token}/{filename}` instead. Without it, a failed
    /// upload fails the remote strategy.
    pub callback_base_url: Option<String>,

    /// Per-HTTP-call timeout in seconds, and the budget for the whole
    /// upload, convert and download sequence. Default: 120.
    pub request_timeout_secs: u64,

    /// Download attempts for the converted file. Default: 3.
    pub download_retries: u32,

    /// Fixed pause between download attempts in milliseconds. Default: 2000.
    pub retry_backoff_ms: u64,
}

impl RemoteServerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            callback_base_url: None,
            request_timeout_secs: 120,
            download_retries: 3,
            retry_backoff_ms: 2000,
        }
    }

    pub fn callback_base_url(mut self, url: impl Into<String>) -> Self {
        self.callback_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_retries(mut self, n: u32) -> Self {
        self.download_retries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("docshift"),
            tools: ToolPaths::new(),
            remote: None,
            max_input_bytes: 100 * 1024 * 1024,
            max_tool_output_bytes: 16 * 1024 * 1024,
            timeouts: Timeouts::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("scratch_dir", &self.scratch_dir)
            .field("tools", &self.tools)
            .field("remote", &self.remote)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("max_tool_output_bytes", &self.max_tool_output_bytes)
            .field("timeouts", &self.timeouts)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ChainProgressCallback>"),
            )
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `DOCSHIFT_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DOCSHIFT_SCRATCH_DIR` | `scratch_dir` |
    /// | `DOCSHIFT_REMOTE_URL` | `remote.base_url` |
    /// | `DOCSHIFT_CALLBACK_URL` | `remote.callback_base_url` |
    /// | `DOCSHIFT_MAX_INPUT_MB` | `max_input_bytes` |
    /// | `DOCSHIFT_SOFFICE`, `DOCSHIFT_GS`, … | `tools` |
    pub fn from_env() -> Result<Self, ConversionError> {
        let mut builder = Self::builder().tools(ToolPaths::from_env());

        if let Some(dir) = non_empty_var("DOCSHIFT_SCRATCH_DIR") {
            builder = builder.scratch_dir(dir);
        }
        if let Some(url) = non_empty_var("DOCSHIFT_REMOTE_URL") {
            let mut remote = RemoteServerConfig::new(url);
            if let Some(cb) = non_empty_var("DOCSHIFT_CALLBACK_URL") {
                remote = remote.callback_base_url(cb);
            }
            builder = builder.remote(remote);
        }
        if let Some(mb) = non_empty_var("DOCSHIFT_MAX_INPUT_MB") {
            let mb: usize = mb.parse().map_err(|_| {
                ConversionError::InvalidConfig(format!("DOCSHIFT_MAX_INPUT_MB must be an integer, got '{mb}'"))
            })?;
            builder = builder.max_input_mb(mb);
        }
        builder.build()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    /// Pin one tool to an explicit program.
    pub fn tool(mut self, tool: Tool, program: impl Into<PathBuf>) -> Self {
        self.config.tools = self.config.tools.with_override(tool, program);
        self
    }

    pub fn remote(mut self, remote: RemoteServerConfig) -> Self {
        self.config.remote = Some(remote);
        self
    }

    pub fn max_input_mb(mut self, mb: usize) -> Self {
        self.config.max_input_bytes = mb.max(1) * 1024 * 1024;
        self
    }

    pub fn max_input_bytes(mut self, bytes: usize) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn max_tool_output_bytes(mut self, bytes: usize) -> Self {
        self.config.max_tool_output_bytes = bytes.max(4096);
        self
    }

    pub fn classify_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.classify = Duration::from_secs(secs);
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.office = Duration::from_secs(secs);
        self
    }

    pub fn script_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.script = Duration::from_secs(secs);
        self
    }

    pub fn compress_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.compress = Duration::from_secs(secs);
        self
    }

    pub fn image_heavy_compress_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.compress_image_heavy = Duration::from_secs(secs);
        self
    }

    pub fn protect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeouts.protect = Duration::from_secs(secs);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ConversionError> {
        let c = &self.config;
        let t = &c.timeouts;
        for (name, d) in [
            ("classify", t.classify),
            ("office", t.office),
            ("script", t.script),
            ("compress", t.compress),
            ("compress_image_heavy", t.compress_image_heavy),
            ("protect", t.protect),
        ] {
            if d.is_zero() {
                return Err(ConversionError::InvalidConfig(format!(
                    "{name} timeout must be greater than 0"
                )));
            }
        }
        if c.max_input_bytes == 0 {
            return Err(ConversionError::InvalidConfig(
                "max_input_bytes must be ≥ 1".into(),
            ));
        }
        if let Some(ref remote) = c.remote {
            if !(remote.base_url.starts_with("http://") || remote.base_url.starts_with("https://")) {
                return Err(ConversionError::InvalidConfig(format!(
                    "remote base URL must be http(s), got '{}'",
                    remote.base_url
                )));
            }
        }
        Ok(self.config)
    }
}
