//! Process runner: spawn one external tool with a timeout and capture its output.
//!
//! Every strategy goes through the [`ProcessRunner`] trait so the chain
//! executor can be driven by a scripted fake in tests. The production
//! implementation, [`TokioProcessRunner`], never goes through a shell: the
//! program and each argument are passed as discrete argv elements.
//!
//! A running child is killed when its future is dropped (`kill_on_drop`),
//! which is how both timeouts and [`CancelToken`] cancellation stop it.

use crate::error::ProcessError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tool_probe::Tool;
use tracing::debug;

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cooperative cancellation shared between a caller and one request.
///
/// Cloning is cheap; all clones observe the same flag. Once cancelled, a
/// token stays cancelled.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token has been cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` can only end by matching.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ── Invocation ───────────────────────────────────────────────────────────

/// One fully-built external command.
#[derive(Clone)]
pub struct Invocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Exit codes other than 0 that still mean success (qpdf exits 3 on warnings).
    pub ok_exit_codes: Vec<i32>,
    /// Value redacted from every rendering of this invocation.
    secret: Option<String>,
}

impl Invocation {
    pub fn new(tool: Tool, program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
            ok_exit_codes: Vec::new(),
            secret: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn accept_exit_code(mut self, code: i32) -> Self {
        self.ok_exit_codes.push(code);
        self
    }

    /// Mark a value (a password) that must never appear in logs.
    pub fn redact(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    /// Basename of the program, for diagnostics.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Command line for logs, with the secret replaced by `***`.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        match &self.secret {
            Some(secret) if !secret.is_empty() => line.replace(secret.as_str(), "***"),
            _ => line,
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("tool", &self.tool)
            .field("command", &self.display())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Captured result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    /// Stdout hit the capture cap; the rest was discarded.
    pub stdout_truncated: bool,
}

impl ProcessOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

// ── Runner ───────────────────────────────────────────────────────────────

/// The seam between the chain executor and the operating system.
pub trait ProcessRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<ProcessOutput, ProcessError>>;
}

/// Production runner on `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    max_output_bytes: usize,
}

impl TokioProcessRunner {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<ProcessOutput, ProcessError>> {
        run_child(invocation, cancel, self.max_output_bytes).boxed()
    }
}

async fn run_child(
    inv: &Invocation,
    cancel: &CancelToken,
    cap: usize,
) -> Result<ProcessOutput, ProcessError> {
    let program = inv.program_name();
    debug!("exec: {}", inv.display());

    let mut cmd = Command::new(&inv.program);
    cmd.args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = inv.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProcessError::NotFound {
                program: program.clone(),
            }
        } else {
            ProcessError::Io {
                program: program.clone(),
                source: e,
            }
        }
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect = async {
        tokio::try_join!(read_capped(stdout, cap), read_capped(stderr, cap), child.wait())
    };

    let ((stdout, stdout_truncated), (stderr, _), status) = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(ProcessError::Cancelled { program });
        }
        res = tokio::time::timeout(inv.timeout, collect) => match res {
            Err(_) => {
                return Err(ProcessError::Timeout { program, timeout: inv.timeout });
            }
            Ok(Err(e)) => return Err(ProcessError::Io { program, source: e }),
            Ok(Ok(out)) => out,
        },
    };
    // `child` is dropped on every early return above, which kills it.

    let exit_code = status.code();
    let ok = status.success() || exit_code.is_some_and(|c| inv.ok_exit_codes.contains(&c));
    if !ok {
        let stderr_text = String::from_utf8_lossy(&stderr).into_owned();
        if exit_code == Some(127) || stderr_text.contains("command not found") {
            return Err(ProcessError::NotFound { program });
        }
        return Err(ProcessError::NonZeroExit {
            program,
            code: exit_code,
            stderr: stderr_text,
        });
    }

    if stdout_truncated {
        debug!("{} stdout exceeded {} bytes; truncated", program, cap);
    }
    Ok(ProcessOutput {
        stdout,
        stderr,
        exit_code,
        stdout_truncated,
    })
}

/// Read at most `cap` bytes, then drain the rest so the child never blocks
/// on a full pipe. The flag is set when anything was drained.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    cap: usize,
) -> std::io::Result<(Vec<u8>, bool)> {
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut buf = Vec::new();
    (&mut reader).take(cap as u64).read_to_end(&mut buf).await?;
    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, dropped > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> Invocation {
        Invocation::new(Tool::Qpdf, "/bin/sh", timeout).args(["-c", script])
    }

    #[test]
    fn display_redacts_secret() {
        let inv = Invocation::new(Tool::Qpdf, "/usr/bin/qpdf", Duration::from_secs(1))
            .arg("--user-password=hunter22")
            .arg("--owner-password=hunter22")
            .redact("hunter22");
        let shown = inv.display();
        assert!(!shown.contains("hunter22"), "got: {shown}");
        assert!(shown.contains("--user-password=***"));
        assert!(!format!("{inv:?}").contains("hunter22"));
    }

    #[test]
    fn program_name_is_basename() {
        let inv = Invocation::new(Tool::Soffice, "/opt/lo/program/soffice", Duration::from_secs(1));
        assert_eq!(inv.program_name(), "soffice");
    }

    #[tokio::test]
    async fn cancel_token_resolves_after_cancel() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        let waiter = tokio::spawn(async move { clone.cancelled().await });
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
        // Already-cancelled tokens resolve immediately.
        token.cancelled().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let runner = TokioProcessRunner::new(1024);
        let out = runner
            .run(&sh("printf hello", Duration::from_secs(10)), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout_text(), "hello");
        assert_eq!(out.exit_code, Some(0));
        assert!(!out.stdout_truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_capped() {
        let runner = TokioProcessRunner::new(4);
        let out = runner
            .run(&sh("printf 0123456789", Duration::from_secs(10)), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout, b"0123");
        assert!(out.stdout_truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let runner = TokioProcessRunner::new(1024);
        let err = runner
            .run(&sh("echo broken >&2; exit 2", Duration::from_secs(10)), &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            ProcessError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(2));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn accepted_exit_code_is_success() {
        let runner = TokioProcessRunner::new(1024);
        let inv = sh("exit 3", Duration::from_secs(10)).accept_exit_code(3);
        let out = runner.run(&inv, &CancelToken::new()).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_127_means_not_found() {
        let runner = TokioProcessRunner::new(1024);
        let err = runner
            .run(&sh("exit 127", Duration::from_secs(10)), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let runner = TokioProcessRunner::new(1024);
        let inv = Invocation::new(
            Tool::Pdftk,
            "/nonexistent/docshift-no-such-tool",
            Duration::from_secs(5),
        );
        let err = runner.run(&inv, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_child() {
        let runner = TokioProcessRunner::new(1024);
        let started = std::time::Instant::now();
        let err = runner
            .run(&sh("sleep 30", Duration::from_millis(200)), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_stops_child() {
        let runner = TokioProcessRunner::new(1024);
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = runner
            .run(&sh("sleep 30", Duration::from_secs(60)), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled { .. }), "got {err:?}");
    }
}
