//! # tool-probe
//!
//! Locate the external command-line tools that docshift drives, so that a
//! missing dependency is reported by name (with an install hint) instead of
//! surfacing as an opaque "No such file or directory" from a subprocess.
//!
//! ## How it works
//!
//! For every [`Tool`] the lookup order is:
//!
//! 1. An explicit override registered with [`ToolPaths::with_override`].
//! 2. The tool's environment variable (e.g. `DOCSHIFT_SOFFICE`), read by
//!    [`ToolPaths::from_env`].
//! 3. Each candidate program name (e.g. `soffice`, then `libreoffice`)
//!    searched on `PATH`.
//! 4. Well-known absolute install locations (macOS app bundles).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tool_probe::{Tool, ToolPaths};
//!
//! let paths = ToolPaths::from_env();
//! match paths.locate(Tool::Ghostscript) {
//!     Ok(path) => println!("gs at {}", path.display()),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```
//!
//! ## Tools
//!
//! | Tool | Candidates | Override |
//! |------|------------|----------|
//! | LibreOffice | `soffice`, `libreoffice` | `DOCSHIFT_SOFFICE` |
//! | Ghostscript | `gs` (`gswin64c`, `gswin32c` on Windows) | `DOCSHIFT_GS` |
//! | qpdf | `qpdf` | `DOCSHIFT_QPDF` |
//! | pdftk | `pdftk` | `DOCSHIFT_PDFTK` |
//! | pdfinfo | `pdfinfo` | `DOCSHIFT_PDFINFO` |
//! | pdftotext | `pdftotext` | `DOCSHIFT_PDFTOTEXT` |
//! | pdf2docx | `pdf2docx` | `DOCSHIFT_PDF2DOCX` |

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Tool catalogue ───────────────────────────────────────────────────────────

/// An external program docshift knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    /// LibreOffice in headless mode (office ⇄ PDF conversion).
    Soffice,
    /// Ghostscript `pdfwrite` device (compression presets).
    Ghostscript,
    /// qpdf (encryption, stream recompression, linearisation).
    Qpdf,
    /// pdftk (alternative encryption tool).
    Pdftk,
    /// poppler `pdfinfo` (page count, encryption, tags, forms).
    Pdfinfo,
    /// poppler `pdftotext` (text layer extraction).
    Pdftotext,
    /// The `pdf2docx` command-line converter.
    Pdf2docx,
}

impl Tool {
    /// Every tool, in the order `probe_all` reports them.
    pub const ALL: [Tool; 7] = [
        Tool::Soffice,
        Tool::Ghostscript,
        Tool::Qpdf,
        Tool::Pdftk,
        Tool::Pdfinfo,
        Tool::Pdftotext,
        Tool::Pdf2docx,
    ];

    /// Short identifier used in logs and strategy ids.
    pub fn id(self) -> &'static str {
        match self {
            Tool::Soffice => "soffice",
            Tool::Ghostscript => "gs",
            Tool::Qpdf => "qpdf",
            Tool::Pdftk => "pdftk",
            Tool::Pdfinfo => "pdfinfo",
            Tool::Pdftotext => "pdftotext",
            Tool::Pdf2docx => "pdf2docx",
        }
    }

    /// Human-readable product name.
    pub fn display_name(self) -> &'static str {
        match self {
            Tool::Soffice => "LibreOffice",
            Tool::Ghostscript => "Ghostscript",
            Tool::Qpdf => "qpdf",
            Tool::Pdftk => "pdftk",
            Tool::Pdfinfo => "pdfinfo (poppler-utils)",
            Tool::Pdftotext => "pdftotext (poppler-utils)",
            Tool::Pdf2docx => "pdf2docx",
        }
    }

    /// Environment variable that overrides the program path.
    pub fn env_var(self) -> &'static str {
        match self {
            Tool::Soffice => "DOCSHIFT_SOFFICE",
            Tool::Ghostscript => "DOCSHIFT_GS",
            Tool::Qpdf => "DOCSHIFT_QPDF",
            Tool::Pdftk => "DOCSHIFT_PDFTK",
            Tool::Pdfinfo => "DOCSHIFT_PDFINFO",
            Tool::Pdftotext => "DOCSHIFT_PDFTOTEXT",
            Tool::Pdf2docx => "DOCSHIFT_PDF2DOCX",
        }
    }

    /// Where to get the tool from.
    pub fn install_hint(self) -> &'static str {
        match self {
            Tool::Soffice => "install LibreOffice (apt install libreoffice-core / brew install --cask libreoffice)",
            Tool::Ghostscript => "install Ghostscript (apt install ghostscript / brew install ghostscript)",
            Tool::Qpdf => "install qpdf (apt install qpdf / brew install qpdf)",
            Tool::Pdftk => "install pdftk (apt install pdftk-java / brew install pdftk-java)",
            Tool::Pdfinfo | Tool::Pdftotext => {
                "install poppler-utils (apt install poppler-utils / brew install poppler)"
            }
            Tool::Pdf2docx => "install pdf2docx into the service image (pip install pdf2docx)",
        }
    }

    /// Program names tried on `PATH`, most specific first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Tool::Soffice => &["soffice", "libreoffice"],
            #[cfg(windows)]
            Tool::Ghostscript => &["gswin64c", "gswin32c", "gs"],
            #[cfg(not(windows))]
            Tool::Ghostscript => &["gs"],
            Tool::Qpdf => &["qpdf"],
            Tool::Pdftk => &["pdftk"],
            Tool::Pdfinfo => &["pdfinfo"],
            Tool::Pdftotext => &["pdftotext"],
            Tool::Pdf2docx => &["pdf2docx"],
        }
    }

    /// Absolute install locations that are not usually on `PATH`.
    fn well_known_locations(self) -> &'static [&'static str] {
        match self {
            Tool::Soffice if cfg!(target_os = "macos") => {
                &["/Applications/LibreOffice.app/Contents/MacOS/soffice"]
            }
            _ => &[],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tool lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// None of the candidate locations holds an executable.
    #[error("{tool} not found (tried: {}).\nFix: {} or set {}=/path/to/{}", .searched.join(", "), .tool.install_hint(), .tool.env_var(), .tool.id())]
    NotFound { tool: Tool, searched: Vec<String> },
}

// ── Lookup ───────────────────────────────────────────────────────────────────

/// Program locations, with optional per-tool overrides.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    overrides: HashMap<Tool, PathBuf>,
}

impl ToolPaths {
    /// No overrides: every tool is searched on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `DOCSHIFT_*` override variables from the environment.
    pub fn from_env() -> Self {
        let mut paths = Self::new();
        for tool in Tool::ALL {
            if let Some(value) = std::env::var_os(tool.env_var()) {
                if !value.is_empty() {
                    paths.overrides.insert(tool, PathBuf::from(value));
                }
            }
        }
        paths
    }

    /// Pin a tool to an explicit program path (or bare program name).
    pub fn with_override(mut self, tool: Tool, program: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool, program.into());
        self
    }

    /// The override registered for `tool`, if any.
    pub fn override_for(&self, tool: Tool) -> Option<&Path> {
        self.overrides.get(&tool).map(PathBuf::as_path)
    }

    /// Resolve `tool` to an executable on disk.
    pub fn locate(&self, tool: Tool) -> Result<PathBuf, ProbeError> {
        let dirs = path_dirs();
        self.locate_in(tool, &dirs)
    }

    /// Same as [`ToolPaths::locate`] but against an explicit directory list.
    pub fn locate_in(&self, tool: Tool, dirs: &[PathBuf]) -> Result<PathBuf, ProbeError> {
        let mut searched = Vec::new();

        if let Some(program) = self.overrides.get(&tool) {
            searched.push(program.display().to_string());
            return find_program(program, dirs).ok_or(ProbeError::NotFound { tool, searched });
        }

        for name in tool.candidates() {
            searched.push((*name).to_string());
            if let Some(found) = find_in_dirs(name, dirs) {
                return Ok(found);
            }
        }

        for location in tool.well_known_locations() {
            searched.push((*location).to_string());
            let p = PathBuf::from(location);
            if is_executable(&p) {
                return Ok(p);
            }
        }

        Err(ProbeError::NotFound { tool, searched })
    }

    /// Resolve every tool once.
    ///
    /// Tools that cannot be found keep their override (or first candidate
    /// name) so a later spawn still fails with a "not found" error that the
    /// caller can attribute to the right tool.
    pub fn resolve_all(&self) -> ResolvedTools {
        let dirs = path_dirs();
        let programs = Tool::ALL
            .iter()
            .map(|&tool| {
                let program = self.locate_in(tool, &dirs).unwrap_or_else(|_| {
                    self.overrides
                        .get(&tool)
                        .cloned()
                        .unwrap_or_else(|| PathBuf::from(tool.candidates()[0]))
                });
                (tool, program)
            })
            .collect();
        ResolvedTools { programs }
    }

    /// Availability report for every tool.
    pub fn probe_all(&self) -> Vec<ToolStatus> {
        let dirs = path_dirs();
        Tool::ALL
            .iter()
            .map(|&tool| ToolStatus {
                tool,
                path: self.locate_in(tool, &dirs).ok(),
            })
            .collect()
    }
}

/// Program paths fixed at construction time.
#[derive(Debug, Clone)]
pub struct ResolvedTools {
    programs: HashMap<Tool, PathBuf>,
}

impl ResolvedTools {
    /// The program to spawn for `tool`.
    pub fn program(&self, tool: Tool) -> &Path {
        self.programs
            .get(&tool)
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(tool.candidates()[0]))
    }
}

impl Default for ResolvedTools {
    fn default() -> Self {
        ToolPaths::new().resolve_all()
    }
}

/// One line of the availability report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default()
}

/// An override may be an absolute/relative path or a bare program name.
fn find_program(program: &Path, dirs: &[PathBuf]) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }
    find_in_dirs(&program.to_string_lossy(), dirs)
}

/// Search `dirs` for an executable called `name`.
pub fn find_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in dirs {
        for file_name in executable_names(name) {
            let candidate = dir.join(&file_name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<OsString> {
    let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.CMD;.BAT;.COM".into());
    let mut names = vec![OsString::from(name)];
    names.extend(exts.split(';').filter(|e| !e.is_empty()).map(|e| OsString::from(format!("{name}{e}"))));
    names
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<OsString> {
    vec![OsString::from(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
