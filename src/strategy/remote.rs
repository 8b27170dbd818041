//! Remote conversion-server strategy.
//!
//! ```text
//! Idle ─▶ Uploading ─▶ Converting ─▶ Downloading ─▶ Done
//!   └──────────┴────────────┴─────────────┴──────▶ Failed
//! ```
//!
//! * **Uploading**: `POST {base}/upload` (multipart field `file`) → `{"url"}`.
//!   If that fails the job falls back to `{callback}/{token}/{filename}`, a
//!   URL the caller is expected to serve; without a callback base the
//!   strategy fails.
//! * **Converting**: `POST {base}/ConvertService` with a synchronous job.
//!   An `error` field in the response is terminal.
//! * **Downloading**: `GET fileUrl`, retried with a fixed pause.
//!
//! Any failure is reported as [`FailureCause::RemoteError`] and the chain
//! moves on to the local strategies.

use crate::config::RemoteServerConfig;
use crate::error::FailureCause;
use crate::model::TargetFormat;
use crate::pipeline::validate::has_zip_signature;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a remote job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Idle,
    Uploading,
    Converting,
    Downloading,
    Done,
    Failed,
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteState::Idle => "idle",
            RemoteState::Uploading => "uploading",
            RemoteState::Converting => "converting",
            RemoteState::Downloading => "downloading",
            RemoteState::Done => "done",
            RemoteState::Failed => "failed",
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertResponse {
    file_url: Option<String>,
    error: Option<Value>,
}

/// HTTP client for one configured conversion server.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    config: RemoteServerConfig,
}

impl RemoteClient {
    pub fn new(config: RemoteServerConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RemoteServerConfig {
        &self.config
    }

    /// Run one job through the state machine.
    ///
    /// `token` is the request's workspace token; it keys the callback URL.
    pub async fn convert(
        &self,
        source: &[u8],
        filename: &str,
        token: &str,
        target: TargetFormat,
    ) -> Result<Vec<u8>, FailureCause> {
        let mut job = RemoteJob::new();
        let result = self.drive(&mut job, source, filename, token, target).await;
        match &result {
            Ok(bytes) => {
                job.advance(RemoteState::Done);
                info!("remote conversion produced {} bytes", bytes.len());
            }
            Err(e) => {
                job.advance(RemoteState::Failed);
                warn!("remote conversion failed: {}", e);
            }
        }
        result
    }

    async fn drive(
        &self,
        job: &mut RemoteJob,
        source: &[u8],
        filename: &str,
        token: &str,
        target: TargetFormat,
    ) -> Result<Vec<u8>, FailureCause> {
        job.advance(RemoteState::Uploading);
        let source_url = match self.upload(source, filename).await {
            Ok(url) => url,
            Err(reason) => {
                let Some(ref callback) = self.config.callback_base_url else {
                    return Err(remote_err(format!(
                        "upload failed ({reason}) and no callback URL is configured"
                    )));
                };
                warn!("upload failed ({}); falling back to callback URL", reason);
                format!("{callback}/{token}/{filename}")
            }
        };

        job.advance(RemoteState::Converting);
        let file_url = self.submit(&source_url, filename, target).await?;

        job.advance(RemoteState::Downloading);
        let bytes = self.download(&file_url).await?;
        if !has_zip_signature(&bytes) {
            warn!("remote result does not start with a ZIP signature; accepting it anyway");
        }
        Ok(bytes)
    }

    async fn upload(&self, source: &[u8], filename: &str) -> Result<String, String> {
        let part = reqwest::multipart::Part::bytes(source.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/upload", self.config.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body: UploadResponse = response.json().await.map_err(|e| e.to_string())?;
        body.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| "response has no url".to_string())
    }

    async fn submit(&self, source_url: &str, title: &str, target: TargetFormat) -> Result<String, FailureCause> {
        let payload = job_payload(source_url, title, target);
        debug!("remote job: {}", payload);

        let response = self
            .http
            .post(format!("{}/ConvertService", self.config.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| remote_err(format!("convert request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(remote_err(format!("convert request returned HTTP {}", response.status())));
        }
        let body: ConvertResponse = response
            .json()
            .await
            .map_err(|e| remote_err(format!("unreadable convert response: {e}")))?;

        if let Some(error) = body.error.filter(|e| !e.is_null()) {
            return Err(remote_err(format!("server reported error {error}")));
        }
        body.file_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| remote_err("convert response has no fileUrl"))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FailureCause> {
        let attempts = self.config.download_retries.max(1);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match self.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!("download attempt {}/{} failed: {}", attempt, attempts, e);
                    last = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(backoff).await;
            }
        }
        Err(remote_err(format!("download failed after {attempts} attempt(s): {last}")))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Tracks and logs state transitions of one job.
#[derive(Debug)]
pub struct RemoteJob {
    state: RemoteState,
}

impl RemoteJob {
    pub fn new() -> Self {
        Self {
            state: RemoteState::Idle,
        }
    }

    pub fn state(&self) -> RemoteState {
        self.state
    }

    pub fn advance(&mut self, next: RemoteState) {
        debug!("remote job: {} → {}", self.state, next);
        self.state = next;
    }
}

impl Default for RemoteJob {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON body for `ConvertService`.
pub fn job_payload(source_url: &str, title: &str, target: TargetFormat) -> Value {
    json!({
        "async": false,
        "filetype": "pdf",
        "outputtype": target.extension(),
        "url": source_url,
        "title": title,
        "key": Uuid::new_v4().to_string(),
        "conversionOptions": conversion_options(target),
    })
}

fn conversion_options(target: TargetFormat) -> Value {
    match target {
        TargetFormat::Docx => json!({
            "preserveFormatting": true,
            "detectTables": true,
            "extractText": true,
        }),
        TargetFormat::Xlsx => json!({
            "detectTables": true,
            "preserveStructure": true,
        }),
        TargetFormat::Pptx => json!({
            "preserveLayout": true,
            "extractImages": true,
        }),
        TargetFormat::Pdf => json!({}),
    }
}

fn remote_err(detail: impl Into<String>) -> FailureCause {
    FailureCause::RemoteError { detail: detail.into() }
}
