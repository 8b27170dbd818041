//! Request-level tests driven by a scripted fake `ProcessRunner`.
//!
//! No external tool is ever spawned: the fake records every invocation and
//! answers per tool with canned output files, stdout, failures or "not
//! installed". Each test gets its own scratch directory so workspace
//! cleanup can be asserted by listing it.

use docshift::{
    CancelToken, ChainProgressCallback, ConversionError, ConversionRequest, Converter, EngineConfig, ErrorKind,
    Invocation, ProcessError, ProcessOutput, ProcessRunner, Quality, SourceKind, TargetFormat, Tool,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// ── Fake runner ──────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Behavior {
    /// Write these bytes to the output path found in argv.
    Produce(Vec<u8>),
    /// Exit 0 with this stdout and no file.
    Stdout(String),
    /// Like `Stdout`, but the runner's capture cap cut it short.
    TruncatedStdout(String),
    /// Exit 1 with this stderr; `{input}` is replaced by the input path.
    Fail(String),
    /// Fire the caller's cancel token, as an upstream disconnect would.
    Cancel,
}

#[derive(Default)]
struct FakeRunner {
    script: HashMap<Tool, Behavior>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    fn new() -> Self {
        Self::default()
    }

    fn on(mut self, tool: Tool, behavior: Behavior) -> Self {
        self.script.insert(tool, behavior);
        self
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    fn tools_called(&self) -> Vec<Tool> {
        self.calls().iter().map(|c| c.tool).collect()
    }

    fn count(&self, tool: Tool) -> usize {
        self.tools_called().iter().filter(|&&t| t == tool).count()
    }
}

fn arg_str(a: &OsString) -> String {
    a.to_string_lossy().into_owned()
}

/// Where the real tool would have written its result.
fn output_path(inv: &Invocation) -> Option<PathBuf> {
    let args: Vec<String> = inv.args.iter().map(arg_str).collect();
    match inv.tool {
        Tool::Ghostscript => args
            .iter()
            .find_map(|a| a.strip_prefix("-sOutputFile=").map(PathBuf::from)),
        Tool::Pdftk => args
            .iter()
            .position(|a| a == "output")
            .map(|i| PathBuf::from(&args[i + 1])),
        Tool::Soffice => {
            let after = |flag: &str| args.iter().position(|a| a == flag).map(|i| args[i + 1].clone());
            let ext = after("--convert-to")?.split(':').next()?.to_string();
            let dir = PathBuf::from(after("--outdir")?);
            let stem = Path::new(args.last()?).file_stem()?.to_string_lossy().into_owned();
            Some(dir.join(format!("{stem}.{ext}")))
        }
        Tool::Qpdf | Tool::Pdf2docx => args.last().map(PathBuf::from),
        Tool::Pdfinfo | Tool::Pdftotext => None,
    }
}

impl ProcessRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancelToken,
    ) -> BoxFuture<'a, Result<ProcessOutput, ProcessError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(invocation.clone());
            let program = invocation.program_name();
            let ok = |stdout: Vec<u8>| ProcessOutput {
                stdout,
                exit_code: Some(0),
                ..ProcessOutput::default()
            };

            match self.script.get(&invocation.tool).cloned() {
                None => Err(ProcessError::NotFound { program }),
                Some(Behavior::Produce(bytes)) => {
                    let path = output_path(invocation).expect("tool has an output argument");
                    tokio::fs::write(&path, bytes).await.unwrap();
                    Ok(ok(Vec::new()))
                }
                Some(Behavior::Stdout(text)) => Ok(ok(text.into_bytes())),
                Some(Behavior::TruncatedStdout(text)) => Ok(ProcessOutput {
                    stdout_truncated: true,
                    ..ok(text.into_bytes())
                }),
                Some(Behavior::Fail(stderr)) => {
                    let input = invocation.args.last().map(arg_str).unwrap_or_default();
                    Err(ProcessError::NonZeroExit {
                        program,
                        code: Some(1),
                        stderr: stderr.replace("{input}", &input),
                    })
                }
                Some(Behavior::Cancel) => {
                    cancel.cancel();
                    Err(ProcessError::Cancelled { program })
                }
            }
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn padded(prefix: &[u8], len: usize) -> Vec<u8> {
    let mut v = prefix.to_vec();
    v.resize(len, b'x');
    v
}

fn text_pdf() -> Vec<u8> {
    padded(b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n", 4_000)
}

fn docx_bytes() -> Vec<u8> {
    padded(b"PK\x03\x04", 5_000)
}

fn encrypted_pdf() -> Vec<u8> {
    padded(b"%PDF-1.7\ntrailer << /Encrypt 5 0 R >>\n", 4_200)
}

struct Harness {
    converter: Converter,
    runner: Arc<FakeRunner>,
    scratch: TempDir,
}

impl Harness {
    fn new(runner: FakeRunner) -> Self {
        Self::with_config(runner, |b| b)
    }

    fn with_config(
        runner: FakeRunner,
        configure: impl FnOnce(docshift::EngineConfigBuilder) -> docshift::EngineConfigBuilder,
    ) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let config = configure(EngineConfig::builder().scratch_dir(scratch.path()))
            .build()
            .unwrap();
        let runner = Arc::new(runner);
        let converter = Converter::with_runner(config, runner.clone()).unwrap();
        Self {
            converter,
            runner,
            scratch,
        }
    }

    /// Entries left behind in the scratch directory.
    fn leftovers(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── End-to-end scenarios ─────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_to_docx_first_strategy_wins_without_office_suite() {
    let h = Harness::new(FakeRunner::new().on(Tool::Pdf2docx, Behavior::Produce(docx_bytes())));

    let out = h
        .converter
        .convert(text_pdf(), SourceKind::Pdf, TargetFormat::Docx)
        .await
        .unwrap();

    assert!(out.starts_with(b"PK"));
    assert!(out.len() > 1000);
    assert_eq!(h.runner.tools_called(), vec![Tool::Pdf2docx]);
    assert_eq!(h.runner.count(Tool::Soffice), 0);
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());
}

#[tokio::test]
async fn image_heavy_pdf_uses_downsampling_with_long_budget() {
    // 5 pages, > 2 MiB per page
    let input = padded(b"%PDF-1.7\n", 11 * 1024 * 1024);
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Pdfinfo, Behavior::Stdout("Pages:          5\nEncrypted:      no\n".into()))
            .on(Tool::Pdftotext, Behavior::Stdout("some text".into()))
            .on(Tool::Ghostscript, Behavior::Produce(padded(b"%PDF-1.5\n", 900_000))),
    );

    let request = ConversionRequest::compress(input.clone(), Quality::Low, "brochure.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert!(out.bytes.starts_with(b"%PDF"));
    assert!(out.bytes.len() < input.len());
    assert!(!out.unchanged);
    assert_eq!(out.strategy, "gs:images-low");
    assert!(out.profile.as_ref().unwrap().is_image_heavy());

    let gs = h
        .runner
        .calls()
        .into_iter()
        .find(|c| c.tool == Tool::Ghostscript)
        .unwrap();
    assert_eq!(gs.timeout, Duration::from_secs(300));
    let args: Vec<String> = gs.args.iter().map(arg_str).collect();
    assert!(args.contains(&"-dPDFSETTINGS=/screen".to_string()));
    assert!(args.contains(&"-dColorImageResolution=72".to_string()));
    assert!(args.contains(&"-dJPEGQ=40".to_string()));
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn protect_primary_tool_succeeds_and_fallbacks_never_run() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Qpdf, Behavior::Produce(encrypted_pdf()))
            .on(Tool::Pdftk, Behavior::Produce(encrypted_pdf())),
    );

    let out = h.converter.protect(text_pdf(), "abcd").await.unwrap();

    assert!(out.starts_with(b"%PDF"));
    assert_eq!(h.runner.tools_called(), vec![Tool::Qpdf]);
    let args: Vec<String> = h.runner.calls()[0].args.iter().map(arg_str).collect();
    assert!(args.contains(&"--bits=256".to_string()));
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn protect_never_degrades_to_an_unprotected_copy() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Qpdf, Behavior::Fail("qpdf: operation failed".into()))
            .on(Tool::Pdftk, Behavior::Fail("Error: Unexpected Exception in open_reader()".into())),
    );

    let err = h.converter.protect(text_pdf(), "abcd").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Exhausted);
    assert_eq!(h.runner.count(Tool::Qpdf), 2);
    assert_eq!(h.runner.count(Tool::Pdftk), 1);
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn option_like_password_never_reaches_qpdf_as_a_bare_argument() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Qpdf, Behavior::Fail("qpdf: operation failed".into()))
            .on(Tool::Pdftk, Behavior::Fail("Error: Unexpected Exception in open_reader()".into())),
    );

    let err = h.converter.protect(text_pdf(), "@/etc/passwd").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Exhausted);
    assert_eq!(h.runner.count(Tool::Qpdf), 1);
    for call in h.runner.calls().iter().filter(|c| c.tool == Tool::Qpdf) {
        assert!(call.args.iter().all(|a| arg_str(a) != "@/etc/passwd"));
    }
}

#[tokio::test]
async fn protect_without_any_encryption_tool_is_tool_unavailable() {
    let h = Harness::new(FakeRunner::new());

    let err = h.converter.protect(text_pdf(), "abcd").await.unwrap_err();

    match &err {
        ConversionError::ToolUnavailable { missing, .. } => {
            assert_eq!(missing, &vec![Tool::Qpdf, Tool::Pdftk]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("qpdf"), "got: {message}");
    assert!(message.contains("DOCSHIFT_PDFTK"), "got: {message}");
    // No hint is worth a classification when nothing is installed.
    assert_eq!(h.runner.count(Tool::Pdfinfo), 0);
}

#[tokio::test]
async fn corrupt_pdf_is_rejected_before_any_strategy() {
    let h = Harness::new(FakeRunner::new().on(Tool::Pdf2docx, Behavior::Produce(docx_bytes())));

    let err = h
        .converter
        .convert(padded(b"GIF89a", 4_000), SourceKind::Pdf, TargetFormat::Docx)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.runner.calls().is_empty());
    assert!(h.leftovers().is_empty());
}

// ── Chain properties ─────────────────────────────────────────────────────────

#[tokio::test]
async fn bad_passwords_fail_before_any_tool() {
    let h = Harness::new(FakeRunner::new().on(Tool::Qpdf, Behavior::Produce(encrypted_pdf())));

    for password in [String::new(), "ab".to_string(), "p".repeat(129)] {
        let err = h.converter.protect(text_pdf(), &password).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "password len {}", password.len());
    }
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn later_strategies_are_not_invoked_after_a_success() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Pdf2docx, Behavior::Fail("Traceback: fitz.FileDataError".into()))
            .on(Tool::Soffice, Behavior::Produce(docx_bytes()))
            .on(Tool::Pdftotext, Behavior::Stdout("never needed".into())),
    );

    let request = ConversionRequest::convert(text_pdf(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert_eq!(out.strategy, "soffice:writer");
    assert_eq!(h.runner.tools_called(), vec![Tool::Pdf2docx, Tool::Soffice]);
    let ids: Vec<&str> = out.attempts.iter().map(|a| a.strategy_id.as_str()).collect();
    assert_eq!(ids, ["pdf2docx", "soffice:writer"]);
    assert!(out.attempts[0].diagnostic.contains("exited with code 1"));
    assert!(out.attempts[1].is_success());
}

#[tokio::test]
async fn undersized_output_is_rejected_and_the_chain_moves_on() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Pdf2docx, Behavior::Produce(padded(b"PK\x03\x04", 400)))
            .on(Tool::Soffice, Behavior::Produce(docx_bytes())),
    );

    let request = ConversionRequest::convert(text_pdf(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert_eq!(out.strategy, "soffice:writer");
    assert_eq!(out.attempts[0].produced_bytes, Some(400));
    assert_eq!(out.attempts[0].status, docshift::OutcomeStatus::RejectedInvalidOutput);
}

#[tokio::test]
async fn text_package_is_the_last_resort_for_docx() {
    let h = Harness::new(FakeRunner::new().on(
        Tool::Pdftotext,
        Behavior::Stdout("Quarterly report\n\nRevenue grew by 12% over the previous quarter.\n".repeat(4)),
    ));

    let request = ConversionRequest::convert(text_pdf(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert_eq!(out.strategy, "text:docx");
    assert!(out.bytes.starts_with(b"PK\x03\x04"));
    let archive = zip::ZipArchive::new(std::io::Cursor::new(out.bytes)).unwrap();
    assert!(archive.file_names().any(|n| n == "word/document.xml"));
}

#[tokio::test]
async fn truncated_text_is_packaged_with_a_warning() {
    let h = Harness::new(FakeRunner::new().on(
        Tool::Pdftotext,
        Behavior::TruncatedStdout("Line of a very long extracted document.\n".repeat(10)),
    ));

    let request = ConversionRequest::convert(text_pdf(), SourceKind::Pdf, TargetFormat::Xlsx, "long.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert_eq!(out.strategy, "text:xlsx");
    let winner = out.attempts.last().unwrap();
    assert!(winner.is_success());
    assert!(winner.diagnostic.contains("truncated"), "got: {}", winner.diagnostic);
    assert!(out.attempts[..out.attempts.len() - 1]
        .iter()
        .all(|a| !a.is_success()));
}

#[tokio::test]
async fn complete_text_leaves_no_warning() {
    let h = Harness::new(FakeRunner::new().on(Tool::Pdftotext, Behavior::Stdout("short and complete\n".repeat(10))));

    let request = ConversionRequest::convert(text_pdf(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert_eq!(out.strategy, "text:docx");
    assert!(out.attempts.last().unwrap().diagnostic.is_empty());
}

#[tokio::test]
async fn office_to_pdf_uses_a_private_profile_and_argv() {
    let h = Harness::new(FakeRunner::new().on(Tool::Soffice, Behavior::Produce(padded(b"%PDF-1.7\n", 3_000))));

    let out = h
        .converter
        .convert(docx_bytes(), SourceKind::Word, TargetFormat::Pdf)
        .await
        .unwrap();

    assert!(out.starts_with(b"%PDF"));
    let call = &h.runner.calls()[0];
    let args: Vec<String> = call.args.iter().map(arg_str).collect();
    assert!(args.iter().any(|a| a.starts_with("-env:UserInstallation=file://")));
    assert!(args.iter().any(|a| a == "--headless"));
    assert!(args.last().unwrap().ends_with("_input.docx"));
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());
}

#[tokio::test]
async fn compression_never_returns_a_larger_file() {
    let input = text_pdf();
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Pdfinfo, Behavior::Stdout("Pages: 1\nEncrypted: no\n".into()))
            .on(Tool::Pdftotext, Behavior::Stdout("hello".into()))
            .on(Tool::Ghostscript, Behavior::Produce(padded(b"%PDF-1.4\n", 9_000))),
    );

    let request = ConversionRequest::compress(input.clone(), Quality::High, "a.pdf");
    let out = h.converter.run(&request, &CancelToken::new()).await.unwrap();

    assert!(out.unchanged);
    assert_eq!(out.bytes, input);
    assert_eq!(out.strategy, "gs:printer");
    assert!(!out.profile.unwrap().is_image_heavy());
}

#[tokio::test]
async fn exhaustion_carries_profile_hint_and_scrubbed_diagnostic() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Pdfinfo, Behavior::Stdout("Tagged: no\nPages: 3\nEncrypted: no\n".into()))
            .on(Tool::Pdftotext, Behavior::Stdout(String::new()))
            .on(Tool::Soffice, Behavior::Fail("Error: source file could not be loaded: {input}".into())),
    );

    let err = h
        .converter
        .convert(text_pdf(), SourceKind::Pdf, TargetFormat::Pptx)
        .await
        .unwrap_err();

    match err {
        ConversionError::Exhausted {
            attempts,
            last_diagnostic,
            hint,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(last_diagnostic.contains("<scratch>"), "got: {last_diagnostic}");
            let scratch = h.scratch.path().to_string_lossy().into_owned();
            assert!(!last_diagnostic.contains(&scratch));
            assert!(!last_diagnostic.contains('\n'));
            assert!(hint.unwrap().contains("scanned"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(h.runner.count(Tool::Pdfinfo), 1);
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn cancellation_stops_the_chain() {
    let h = Harness::new(
        FakeRunner::new()
            .on(Tool::Qpdf, Behavior::Cancel)
            .on(Tool::Pdftk, Behavior::Produce(encrypted_pdf())),
    );

    let request = ConversionRequest::protect(text_pdf(), "abcd", "a.pdf").unwrap();
    let err = h.converter.run(&request, &CancelToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(h.runner.tools_called(), vec![Tool::Qpdf]);
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn an_already_cancelled_token_runs_nothing() {
    let h = Harness::new(FakeRunner::new().on(Tool::Qpdf, Behavior::Produce(encrypted_pdf())));
    let cancel = CancelToken::new();
    cancel.cancel();

    let request = ConversionRequest::protect(text_pdf(), "abcd", "a.pdf").unwrap();
    assert_err!(h.converter.run(&request, &cancel).await);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn password_never_appears_in_logged_invocations() {
    let h = Harness::new(FakeRunner::new().on(Tool::Qpdf, Behavior::Produce(encrypted_pdf())));
    assert_ok!(h.converter.protect(text_pdf(), "hunter22").await);

    let call = &h.runner.calls()[0];
    assert!(!call.display().contains("hunter22"));
    assert!(!format!("{call:?}").contains("hunter22"));
}

#[tokio::test]
async fn inspect_reports_the_profile() {
    let h = Harness::new(
        FakeRunner::new()
            .on(
                Tool::Pdfinfo,
                Behavior::Stdout("Tagged: yes\nForm: AcroForm\nPages: 12\nEncrypted: no\n".into()),
            )
            .on(Tool::Pdftotext, Behavior::Stdout("text layer".into())),
    );

    let profile = h.converter.inspect(&text_pdf()).await.unwrap();

    assert_eq!(profile.page_count, 12);
    assert!(profile.has_complex_layout);
    assert!(!profile.is_scanned);
    assert!(!profile.is_fallback);
    assert!(h.leftovers().is_empty());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ChainProgressCallback for Recorder {
    fn on_chain_start(&self, operation: &str, strategies: usize) {
        self.events.lock().unwrap().push(format!("start {operation} {strategies}"));
    }
    fn on_strategy_start(&self, index: usize, total: usize, strategy_id: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("try {index}/{total} {strategy_id}"));
    }
    fn on_strategy_success(&self, strategy_id: &str, _output_bytes: usize) {
        self.events.lock().unwrap().push(format!("ok {strategy_id}"));
    }
    fn on_strategy_failed(&self, strategy_id: &str, _diagnostic: &str) {
        self.events.lock().unwrap().push(format!("fail {strategy_id}"));
    }
    fn on_chain_complete(&self, success: bool, attempts: usize) {
        self.events.lock().unwrap().push(format!("done {success} {attempts}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_chain() {
    let recorder = Arc::new(Recorder::default());
    let h = Harness::with_config(
        FakeRunner::new().on(Tool::Pdftk, Behavior::Produce(encrypted_pdf())),
        |b| b.progress_callback(recorder.clone()),
    );

    assert_ok!(h.converter.protect(text_pdf(), "abcd").await);

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "start PDF protection 3",
            "try 1/3 qpdf:aes256",
            "fail qpdf:aes256",
            "try 2/3 pdftk:aes128",
            "ok pdftk:aes128",
            "done true 2",
        ]
    );
}
