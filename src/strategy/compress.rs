//! PDF compression strategies: Ghostscript presets, then qpdf recompression.

use super::{Action, GsPreset, Plan, Strategy, StrategyContext};
use crate::config::Timeouts;
use crate::model::Quality;
use crate::pipeline::validate::MIN_OUTPUT_BYTES;
use tool_probe::Tool;

/// Compression chain for one quality tier.
///
/// Image-heavy documents try explicit downsampling first, with the longer
/// time budget, and keep the plain preset as their second attempt.
pub fn chain(quality: Quality, image_heavy: bool, t: &Timeouts) -> Vec<Strategy> {
    let mut chain = Vec::with_capacity(3);
    if image_heavy {
        chain.push(Strategy::tool(
            image_id(quality),
            Action::Ghostscript(GsPreset::ImageHeavy(quality)),
            t.compress_image_heavy,
            MIN_OUTPUT_BYTES,
        ));
    }
    let preset_timeout = if image_heavy {
        t.compress_image_heavy
    } else {
        t.compress
    };
    chain.push(Strategy::tool(
        preset_id(quality),
        Action::Ghostscript(GsPreset::Text(quality)),
        preset_timeout,
        MIN_OUTPUT_BYTES,
    ));
    chain.push(Strategy::tool(
        "qpdf:recompress",
        Action::QpdfRecompress,
        t.compress,
        MIN_OUTPUT_BYTES,
    ));
    chain
}

fn preset_id(q: Quality) -> &'static str {
    match q {
        Quality::Low => "gs:screen",
        Quality::Moderate => "gs:ebook",
        Quality::High => "gs:printer",
    }
}

fn image_id(q: Quality) -> &'static str {
    match q {
        Quality::Low => "gs:images-low",
        Quality::Moderate => "gs:images-moderate",
        Quality::High => "gs:images-high",
    }
}

/// `-dPDFSETTINGS` value for a tier.
pub fn pdf_settings(q: Quality) -> &'static str {
    match q {
        Quality::Low => "/screen",
        Quality::Moderate => "/ebook",
        Quality::High => "/printer",
    }
}

/// Target image resolution (dpi) and JPEG quality for image-heavy documents.
pub fn image_params(q: Quality) -> (u32, u32) {
    match q {
        Quality::Low => (72, 40),
        Quality::Moderate => (110, 60),
        Quality::High => (150, 80),
    }
}

pub(crate) fn plan_ghostscript(strategy: &Strategy, ctx: &StrategyContext<'_>, preset: GsPreset) -> Plan {
    let output = ctx.output_path();
    let quality = match preset {
        GsPreset::Text(q) | GsPreset::ImageHeavy(q) => q,
    };

    let mut invocation = ctx.invocation(strategy, Tool::Ghostscript).args([
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        format!("-dPDFSETTINGS={}", pdf_settings(quality)),
        "-dNOPAUSE".to_string(),
        "-dQUIET".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        "-dDetectDuplicateImages=true".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dSubsetFonts=true".to_string(),
    ]);

    if let GsPreset::ImageHeavy(q) = preset {
        let (dpi, jpeg_q) = image_params(q);
        invocation = invocation.args([
            "-dDownsampleColorImages=true".to_string(),
            "-dColorImageDownsampleType=/Bicubic".to_string(),
            format!("-dColorImageResolution={dpi}"),
            "-dDownsampleGrayImages=true".to_string(),
            "-dGrayImageDownsampleType=/Bicubic".to_string(),
            format!("-dGrayImageResolution={dpi}"),
            "-dDownsampleMonoImages=true".to_string(),
            "-dMonoImageDownsampleType=/Subsample".to_string(),
            format!("-dMonoImageResolution={}", dpi * 2),
            "-dAutoFilterColorImages=false".to_string(),
            "-dColorImageFilter=/DCTEncode".to_string(),
            "-dAutoFilterGrayImages=false".to_string(),
            "-dGrayImageFilter=/DCTEncode".to_string(),
            format!("-dJPEGQ={jpeg_q}"),
        ]);
    }

    let mut out_arg = std::ffi::OsString::from("-sOutputFile=");
    out_arg.push(output.as_os_str());
    let invocation = invocation.arg(out_arg).arg(ctx.input.as_os_str());

    Plan::Process {
        invocation,
        outputs: vec![output],
    }
}

/// qpdf exits 3 when it succeeded with warnings, common on slightly damaged files.
pub(crate) fn plan_qpdf(strategy: &Strategy, ctx: &StrategyContext<'_>) -> Plan {
    let output = ctx.output_path();
    let invocation = ctx
        .invocation(strategy, Tool::Qpdf)
        .args([
            "--object-streams=generate",
            "--compress-streams=y",
            "--recompress-flate",
            "--compression-level=9",
            "--linearize",
        ])
        .arg(ctx.input.as_os_str())
        .arg(output.as_os_str())
        .accept_exit_code(3);
    Plan::Process {
        invocation,
        outputs: vec![output],
    }
}
