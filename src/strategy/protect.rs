//! PDF protection strategies.
//!
//! Every entry requires an `/Encrypt` dictionary in its output. When the
//! whole chain fails the request fails; an unprotected copy is never
//! returned as a protected one.
//!
//! The owner password is set to the user password. Arguments travel as
//! discrete argv elements, so passwords need no shell escaping.

use super::{Action, Plan, Strategy, StrategyContext};
use crate::config::Timeouts;
use crate::pipeline::validate::MIN_OUTPUT_BYTES;
use tool_probe::Tool;

pub fn chain(t: &Timeouts, password: &str) -> Vec<Strategy> {
    [
        ("qpdf:aes256", Action::QpdfEncrypt),
        ("pdftk:aes128", Action::PdftkEncrypt),
        ("qpdf:aes256-positional", Action::QpdfEncryptPositional),
    ]
    .into_iter()
    .filter(|(_, action)| *action != Action::QpdfEncryptPositional || positional_safe(password))
    .map(|(id, action)| Strategy {
        require_encryption: true,
        ..Strategy::tool(id, action, t.protect, MIN_OUTPUT_BYTES)
    })
    .collect()
}

/// qpdf reads a bare `-x` argument as an option and `@file` as a response
/// file, so such passwords only travel in the `--user-password=` form.
fn positional_safe(password: &str) -> bool {
    !password.starts_with(&['-', '@'][..])
}

pub(crate) fn plan_encrypt(strategy: &Strategy, ctx: &StrategyContext<'_>) -> Plan {
    let output = ctx.output_path();
    let password = ctx.request.password().unwrap_or_default();
    let input = ctx.input.as_os_str();

    let invocation = match strategy.action {
        Action::PdftkEncrypt => ctx
            .invocation(strategy, Tool::Pdftk)
            .arg(input)
            .arg("output")
            .arg(output.as_os_str())
            .args(["user_pw", password, "owner_pw", password, "encrypt_128bit"]),
        Action::QpdfEncryptPositional => ctx
            .invocation(strategy, Tool::Qpdf)
            .args(["--encrypt", password, password, "256", "--"])
            .arg(input)
            .arg(output.as_os_str())
            .accept_exit_code(3),
        _ => ctx
            .invocation(strategy, Tool::Qpdf)
            .arg("--encrypt")
            .arg(format!("--user-password={password}"))
            .arg(format!("--owner-password={password}"))
            .args(["--bits=256", "--"])
            .arg(input)
            .arg(output.as_os_str())
            .accept_exit_code(3),
    };

    Plan::Process {
        invocation: invocation.redact(password),
        outputs: vec![output],
    }
}
