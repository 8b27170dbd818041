//! Office-suite strategies: LibreOffice exports and the `pdf2docx` script.

use super::{file_url, Action, Plan, SignatureCheck, Strategy, StrategyContext, StrategyKind};
use crate::config::{RemoteServerConfig, Timeouts};
use crate::model::TargetFormat;
use crate::pipeline::validate::MIN_OUTPUT_BYTES;
use tool_probe::Tool;

/// Office outputs below this are empty shells, not conversions.
pub const OFFICE_MIN_OUTPUT_BYTES: usize = 1000;

/// Office document → PDF. LibreOffice handles this direction reliably on its own.
pub fn office_to_pdf(t: &Timeouts) -> Vec<Strategy> {
    vec![Strategy::tool(
        "soffice:pdf",
        Action::OfficeExport {
            infilter: None,
            convert_to: "pdf",
        },
        t.office,
        MIN_OUTPUT_BYTES,
    )]
}

/// PDF → OOXML, best fidelity first.
pub fn pdf_to_office(target: TargetFormat, remote: Option<&RemoteServerConfig>, t: &Timeouts) -> Vec<Strategy> {
    let mut chain = Vec::new();

    if let Some(remote) = remote {
        chain.push(Strategy {
            id: "remote",
            kind: StrategyKind::RemoteService,
            action: Action::Remote,
            timeout: std::time::Duration::from_secs(remote.request_timeout_secs),
            min_output_bytes: OFFICE_MIN_OUTPUT_BYTES,
            signature: SignatureCheck::Advisory,
            require_encryption: false,
        });
    }

    let export = |id, infilter, convert_to| {
        Strategy::tool(
            id,
            Action::OfficeExport { infilter, convert_to },
            t.office,
            OFFICE_MIN_OUTPUT_BYTES,
        )
    };

    match target {
        TargetFormat::Docx => {
            chain.push(Strategy::tool("pdf2docx", Action::Pdf2Docx, t.script, OFFICE_MIN_OUTPUT_BYTES));
            chain.push(export(
                "soffice:writer",
                Some("writer_pdf_import"),
                "docx:MS Word 2007 XML",
            ));
            chain.push(export("soffice:writer-default", Some("writer_pdf_import"), "docx"));
            chain.push(Strategy::tool("text:docx", Action::TextOoxml, t.script, MIN_OUTPUT_BYTES));
        }
        TargetFormat::Xlsx => {
            chain.push(export(
                "soffice:calc",
                Some("calc_pdf_import"),
                "xlsx:Calc MS Excel 2007 XML",
            ));
            chain.push(export("soffice:calc-default", None, "xlsx"));
            chain.push(Strategy::tool("text:xlsx", Action::TextOoxml, t.script, MIN_OUTPUT_BYTES));
        }
        TargetFormat::Pptx => {
            chain.push(export(
                "soffice:impress",
                Some("impress_pdf_import"),
                "pptx:Impress MS PowerPoint 2007 XML",
            ));
            chain.push(export("soffice:draw", Some("draw_pdf_import"), "pptx"));
        }
        TargetFormat::Pdf => {}
    }
    chain
}

/// `soffice --headless --convert-to <convert_to> --outdir <ws> <input>`.
///
/// LibreOffice names its output after the input stem, so the candidate is
/// `<ws>/<input_stem>.<ext>`. A private user profile inside the workspace
/// keeps concurrent requests from contending for the default profile lock.
pub(crate) fn plan_export(
    strategy: &Strategy,
    ctx: &StrategyContext<'_>,
    infilter: Option<&'static str>,
    convert_to: &'static str,
) -> Plan {
    let ext = convert_to.split(':').next().unwrap_or(convert_to);
    let profile = ctx.workspace.subdir("lo_profile");

    let mut invocation = ctx
        .invocation(strategy, Tool::Soffice)
        .args(["--headless", "--norestore", "--nolockcheck", "--nodefault", "--nofirststartwizard"])
        .arg(format!("-env:UserInstallation={}", file_url(&profile)));
    if let Some(filter) = infilter {
        invocation = invocation.arg(format!("--infilter={filter}"));
    }
    let invocation = invocation
        .arg("--convert-to")
        .arg(convert_to)
        .arg("--outdir")
        .arg(ctx.workspace.dir().as_os_str())
        .arg(ctx.input.as_os_str());

    let stem = ctx
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = ctx.workspace.dir();
    Plan::Process {
        invocation,
        outputs: vec![
            dir.join(format!("{stem}.{ext}")),
            dir.join(format!("{stem}.{}", ext.to_ascii_uppercase())),
        ],
    }
}

/// `pdf2docx convert <input> <output>`.
pub(crate) fn plan_pdf2docx(strategy: &Strategy, ctx: &StrategyContext<'_>) -> Plan {
    let output = ctx.output_path();
    let invocation = ctx
        .invocation(strategy, Tool::Pdf2docx)
        .arg("convert")
        .arg(ctx.input.as_os_str())
        .arg(output.as_os_str());

    // Without an explicit output, pdf2docx writes next to the input.
    let sibling = ctx.input.with_extension("docx");
    Plan::Process {
        invocation,
        outputs: vec![output, sibling],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{ConversionRequest, SourceKind};
    use crate::pipeline::workspace::Workspace;
    use tool_probe::ResolvedTools;

    #[tokio::test]
    async fn export_args_and_candidates() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let req = ConversionRequest::convert(b"%PDF".to_vec(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
        let input = ws.path("input", "pdf");
        let tools = ResolvedTools::default();
        let ctx = StrategyContext {
            request: &req,
            workspace: &ws,
            input: &input,
            tools: &tools,
        };
        let chain = pdf_to_office(TargetFormat::Docx, None, &EngineConfig::default().timeouts);
        let writer = chain.iter().find(|s| s.id == "soffice:writer").unwrap();

        let Plan::Process { invocation, outputs } = writer.plan(&ctx) else {
            panic!("expected a process plan");
        };
        let line = invocation.display();
        assert!(line.contains("--headless"));
        assert!(line.contains("--infilter=writer_pdf_import"));
        assert!(line.contains("--convert-to docx:MS Word 2007 XML"));
        assert!(line.contains("-env:UserInstallation=file://"));
        assert_eq!(outputs[0], ws.path("input", "docx"));
        ws.close().await;
    }

    #[tokio::test]
    async fn pdf2docx_targets_workspace_output() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).await.unwrap();
        let req = ConversionRequest::convert(b"%PDF".to_vec(), SourceKind::Pdf, TargetFormat::Docx, "a.pdf");
        let input = ws.path("input", "pdf");
        let tools = ResolvedTools::default();
        let ctx = StrategyContext {
            request: &req,
            workspace: &ws,
            input: &input,
            tools: &tools,
        };
        let strategy = Strategy::tool("pdf2docx", Action::Pdf2Docx, std::time::Duration::from_secs(1), 1000);
        let Plan::Process { invocation, outputs } = strategy.plan(&ctx) else {
            panic!("expected a process plan");
        };
        assert_eq!(invocation.args[0], "convert");
        assert_eq!(outputs[0], ws.path("output", "docx"));
        assert!(outputs.iter().all(|p| p.file_name().unwrap().to_string_lossy().starts_with(ws.token())));
        ws.close().await;
    }

    #[test]
    fn pptx_has_no_native_fallback() {
        let chain = pdf_to_office(TargetFormat::Pptx, None, &Timeouts::default());
        assert!(chain.iter().all(|s| s.action != Action::TextOoxml));
        assert!(chain.iter().all(|s| s.min_output_bytes == OFFICE_MIN_OUTPUT_BYTES));
    }
}
