// Diagnostic Parser
// Turns raw compiler stderr into an ordered sequence of Diagnostic records

use crate::error::Degradation;
use cwhy_utils::{Diagnostic, Severity};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

/// `path:line[:col]: severity: message`, emitted by GCC and Clang
static GNU_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>\S.*?):(?P<line>\d+):(?:(?P<col>\d+):)? (?P<sev>fatal error|error|warning|note): (?P<msg>.*)$",
    )
    .expect("valid gnu header regex")
});

/// `path(line[,col]): severity[ CODE]: message`, emitted by MSVC and clang-cl
static MSVC_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<path>\S.*?)\((?P<line>\d+)(?:,(?P<col>\d+))?\) ?: (?P<sev>fatal error|error|warning|note)(?: [A-Z]+\d+)?: (?P<msg>.*)$",
    )
    .expect("valid msvc header regex")
});

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid ansi escape regex"));

/// The location and severity carried by a diagnostic header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    pub path: &'a str,
    pub line: usize,
    pub column: Option<usize>,
    pub severity: Severity,
    pub message: &'a str,
}

impl HeaderLine<'_> {
    /// GCC indents the message of notes that elaborate on the previous
    /// record ("note:   template argument deduction/substitution failed:").
    pub fn is_elaboration(&self) -> bool {
        self.severity == Severity::Note && self.message.starts_with(char::is_whitespace)
    }

    fn to_diagnostic(&self, raw_line: &str) -> Diagnostic {
        Diagnostic {
            severity: self.severity,
            file_path: self.path.to_string(),
            line: self.line,
            column: self.column,
            message: self.message.trim().to_string(),
            raw_text: raw_line.to_string(),
        }
    }
}

/// A physical line of compiler output, classified by the first matcher
/// that accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticLine<'a> {
    Gnu(HeaderLine<'a>),
    Msvc(HeaderLine<'a>),
    Unrecognized(&'a str),
}

impl<'a> DiagnosticLine<'a> {
    pub fn header(&self) -> Option<&HeaderLine<'a>> {
        match self {
            DiagnosticLine::Gnu(header) | DiagnosticLine::Msvc(header) => Some(header),
            DiagnosticLine::Unrecognized(_) => None,
        }
    }
}

/// Classify one line (already stripped of colour escapes)
pub fn classify_line(line: &str) -> DiagnosticLine<'_> {
    if let Some(header) = GNU_HEADER.captures(line).and_then(header_from) {
        return DiagnosticLine::Gnu(header);
    }
    if let Some(header) = MSVC_HEADER.captures(line).and_then(header_from) {
        return DiagnosticLine::Msvc(header);
    }
    DiagnosticLine::Unrecognized(line)
}

fn header_from(caps: Captures<'_>) -> Option<HeaderLine<'_>> {
    let path = caps.name("path")?.as_str();
    let line = caps.name("line")?.as_str().parse().ok()?;
    let column = match caps.name("col") {
        Some(col) => Some(col.as_str().parse().ok()?),
        None => None,
    };
    let severity = Severity::from_label(caps.name("sev")?.as_str())?;
    let message = caps.name("msg")?.as_str();

    Some(HeaderLine {
        path,
        line,
        column,
        severity,
        message,
    })
}

/// Remove terminal colour sequences (`-fdiagnostics-color=always`)
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// Diagnostics parsed from one compiler run, plus any degradation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseReport {
    pub diagnostics: Vec<Diagnostic>,
    pub degradation: Option<Degradation>,
}

/// Parse raw compiler stderr into Diagnostic records, in emission order.
///
/// Never fails: unrecognized output yields an empty sequence.
pub fn parse(raw_text: &str) -> Vec<Diagnostic> {
    parse_report(raw_text).diagnostics
}

/// Parse and report whether the output was in an unrecognized dialect.
pub fn parse_report(raw_text: &str) -> ParseReport {
    let clean = strip_ansi(raw_text);
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    // Record that continuation lines are appended to
    let mut open: Option<usize> = None;
    let mut content_lines = 0;

    for line in clean.lines() {
        if line.trim().is_empty() {
            open = None;
            continue;
        }
        content_lines += 1;

        let classified = classify_line(line);
        match (classified.header(), open) {
            (Some(header), Some(index)) if header.is_elaboration() => {
                append_raw(&mut diagnostics[index], line);
            }
            (Some(header), _) => {
                diagnostics.push(header.to_diagnostic(line));
                open = Some(diagnostics.len() - 1);
            }
            (None, Some(index)) => append_raw(&mut diagnostics[index], line),
            (None, None) => log::trace!("Dropping unattached line: {}", line),
        }
    }

    let degradation = (diagnostics.is_empty() && content_lines > 0).then_some(
        Degradation::ParseDegraded {
            lines: content_lines,
        },
    );

    log::debug!(
        "Parsed {} diagnostic(s) from {} line(s)",
        diagnostics.len(),
        content_lines
    );

    ParseReport {
        diagnostics,
        degradation,
    }
}

fn append_raw(diagnostic: &mut Diagnostic, line: &str) {
    diagnostic.raw_text.push('\n');
    diagnostic.raw_text.push_str(line);
}
