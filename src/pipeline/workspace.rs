//! Per-request scratch namespace inside the shared scratch directory.
//!
//! Requests do not get their own directory. They share one process-wide
//! scratch directory and are partitioned by a unique token that prefixes
//! every file name they create (`<token>_<label>.<ext>`). Cleanup removes
//! every entry carrying that prefix, so a tool that writes an unexpected
//! name next to its input is swept as well, as long as it kept the prefix.
//!
//! Cleanup runs from [`Workspace::close`] on the normal path and from `Drop`
//! on every other path (early `?` return, panic, cancelled task). Failures
//! to delete are logged and never raised.

use crate::error::ConversionError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Scoped scratch-file context for one request.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    token: String,
    swept: bool,
}

/// Timestamp plus 12 hex characters of a random UUID.
pub fn new_token() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%3f"), &random[..12])
}

impl Workspace {
    /// Ensure the scratch directory exists and is writable, then reserve a token.
    ///
    /// Safe to call concurrently for the same directory.
    pub async fn create(root: &Path) -> Result<Self, ConversionError> {
        let dir = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        let scratch_err = |source: std::io::Error| ConversionError::Scratch {
            path: dir.clone(),
            source,
        };

        tokio::fs::create_dir_all(&dir).await.map_err(scratch_err)?;
        set_world_writable(&dir).await;

        let token = new_token();
        let probe = dir.join(format!("{token}_probe"));
        tokio::fs::write(&probe, b"").await.map_err(scratch_err)?;
        let _ = tokio::fs::remove_file(&probe).await;

        debug!("workspace {} in {}", token, dir.display());
        Ok(Self {
            dir,
            token,
            swept: false,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<token>_<label>.<ext>`
    pub fn path(&self, label: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{label}.{ext}", self.token))
    }

    /// `<dir>/<token>_<label>`, for tools that need a directory of their own.
    pub fn subdir(&self, label: &str) -> PathBuf {
        self.dir.join(format!("{}_{label}", self.token))
    }

    /// Write the request's source bytes to `<token>_input.<ext>`.
    pub async fn write_input(&self, bytes: &[u8], ext: &str) -> Result<PathBuf, ConversionError> {
        let path = self.path("input", ext);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ConversionError::Scratch {
                path: self.dir.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Best-effort unlink of one path. Missing files are not an error.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove scratch file {}: {}", path.display(), e),
        }
    }

    /// Sweep every entry carrying this workspace's token.
    pub async fn close(mut self) {
        self.swept = true;
        let dir = self.dir.clone();
        let token = self.token.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sweep(&dir, &token)).await {
            warn!("scratch cleanup task failed: {}", e);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.swept {
            return;
        }
        let dir = self.dir.clone();
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || sweep(&dir, &token));
            }
            Err(_) => sweep(&dir, &token),
        }
    }
}

/// Remove every entry of `dir` whose name starts with `token`.
fn sweep(dir: &Path, token: &str) {
    if token.is_empty() {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("could not list scratch dir {}: {}", dir.display(), e);
            return;
        }
    };
    let mut removed = 0usize;
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(token) {
            continue;
        }
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let res = if is_dir {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match res {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove scratch entry {}: {}", path.display(), e),
        }
    }
    debug!("workspace {} swept ({} entries)", token, removed);
}

#[cfg(unix)]
async fn set_world_writable(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    // Only possible for the owner; other users' directories are left alone.
    let _ = tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).await;
}

#[cfg(not(unix))]
async fn set_world_writable(_dir: &Path) {}
