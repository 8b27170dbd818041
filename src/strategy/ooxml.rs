//! Text-only last resort for PDF → DOCX / XLSX.
//!
//! `pdftotext -layout` recovers the text layer; this module wraps it in the
//! smallest Office Open XML package Word or Excel will open. Formatting,
//! images and tables are lost. There is no presentation counterpart.

use super::{Plan, Strategy, StrategyContext};
use crate::error::FailureCause;
use crate::model::TargetFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use tool_probe::Tool;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Two or more spaces separate columns in `-layout` output.
static RE_COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Sheet rows beyond this are dropped; the format allows 1,048,576.
const MAX_ROWS: usize = 1_048_576;

pub(crate) fn plan_extract(strategy: &Strategy, ctx: &StrategyContext<'_>) -> Plan {
    let invocation = ctx
        .invocation(strategy, Tool::Pdftotext)
        .args(["-layout", "-enc", "UTF-8", "-q"])
        .arg(ctx.input.as_os_str())
        .arg("-");
    Plan::ExtractText {
        invocation,
        target: ctx.request.target_format(),
    }
}

/// Package extracted text as `target`.
pub fn package_text(text: &str, target: TargetFormat) -> Result<Vec<u8>, FailureCause> {
    if text.trim().is_empty() {
        return Err(FailureCause::InvalidOutput {
            reason: "no extractable text".into(),
        });
    }
    let parts: Vec<(&str, String)> = match target {
        TargetFormat::Docx => docx_parts(text),
        TargetFormat::Xlsx => xlsx_parts(text),
        other => {
            return Err(FailureCause::ToolError {
                detail: format!("no text packaging for {other}"),
            })
        }
    };
    write_zip(&parts).map_err(|e| FailureCause::ToolError {
        detail: format!("packaging failed: {e}"),
    })
}

fn write_zip(parts: &[(&str, String)]) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in parts {
        zip.start_file(*name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

// ── DOCX ─────────────────────────────────────────────────────────────────

fn docx_parts(text: &str) -> Vec<(&'static str, String)> {
    let mut body = String::new();
    // pdftotext separates pages with form feeds.
    for (i, page) in text.split('\x0c').enumerate() {
        if i > 0 && !page.trim().is_empty() {
            body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#);
        }
        for line in page.lines() {
            if line.trim().is_empty() {
                body.push_str("<w:p/>");
            } else {
                body.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
                body.push_str(&xml_escape(line.trim_end()));
                body.push_str("</w:t></w:r></w:p>");
            }
        }
    }

    let document = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>{}<w:sectPr/></w:body></w:document>"
        ),
        body
    );

    vec![
        (
            "[Content_Types].xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                "</Types>"
            )
            .to_string(),
        ),
        ("_rels/.rels", root_rels("word/document.xml")),
        ("word/document.xml", document),
    ]
}

// ── XLSX ─────────────────────────────────────────────────────────────────

fn xlsx_parts(text: &str) -> Vec<(&'static str, String)> {
    let mut rows = String::new();
    let lines = text
        .lines()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == '\x0c'))
        .filter(|l| !l.is_empty())
        .take(MAX_ROWS);
    for (r, line) in lines.enumerate() {
        let row = r + 1;
        rows.push_str(&format!(r#"<row r="{row}">"#));
        for (c, cell) in RE_COLUMN_GAP.split(line).enumerate() {
            rows.push_str(&format!(
                r#"<c r="{}{row}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_name(c),
                xml_escape(cell)
            ));
        }
        rows.push_str("</row>");
    }

    let sheet = format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
            "<sheetData>{}</sheetData></worksheet>"
        ),
        rows
    );

    vec![
        (
            "[Content_Types].xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
                r#"<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                "</Types>"
            )
            .to_string(),
        ),
        ("_rels/.rels", root_rels("xl/workbook.xml")),
        (
            "xl/workbook.xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#
            )
            .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>"#,
                "</Relationships>"
            )
            .to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ]
}

/// Zero-based column index to `A`, `B`, …, `Z`, `AA`, …
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

// ── Shared ───────────────────────────────────────────────────────────────

fn root_rels(main_part: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
            r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="{}"/>"#,
            "</Relationships>"
        ),
        main_part
    )
}

/// Escape markup characters and drop code points XML 1.0 forbids.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}
