//! Shared data types for cwhy
//!
//! This crate contains the records exchanged between the diagnostic parser,
//! the source locator, the context bundler and the fixture store. It does no
//! I/O, so both the engine and its tests can depend on it freely.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a compiler diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    /// Map a compiler severity label onto a Severity.
    ///
    /// `fatal error` is folded into `Error`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "error" | "fatal error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured error, warning or note extracted from compiler output.
///
/// `line` and `column` are 1-based. `raw_text` holds the header line plus
/// every continuation line (excerpts, carets, elaboration notes) that the
/// compiler emitted for this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file_path: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    pub message: String,
    pub raw_text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(
                f,
                "{}:{}:{}: {}: {}",
                self.file_path, self.line, column, self.severity, self.message
            ),
            None => write!(
                f,
                "{}:{}: {}: {}",
                self.file_path, self.line, self.severity, self.message
            ),
        }
    }
}

/// Where a source file lives relative to the user's project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanOrigin {
    /// Under the project root
    Project,
    /// System or library header outside the project root
    External,
}

/// A contiguous, inclusive range of lines sliced out of one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub origin: SpanOrigin,
    pub text: String,
}

impl SourceSpan {
    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// Size counted against the bundle byte budget
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

/// The bounded, deterministic package handed to the explanation backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub diagnostics: Vec<Diagnostic>,
    pub spans: BTreeMap<String, Vec<SourceSpan>>,
    pub truncated: bool,
}

impl ContextBundle {
    /// The span covering a diagnostic's location, if one survived.
    pub fn span_for(&self, diagnostic: &Diagnostic) -> Option<&SourceSpan> {
        self.spans
            .get(&diagnostic.file_path)?
            .iter()
            .find(|span| span.contains_line(diagnostic.line))
    }

    /// Total bytes of span text in the bundle
    pub fn span_bytes(&self) -> usize {
        self.spans.values().flatten().map(SourceSpan::byte_len).sum()
    }

    pub fn span_count(&self) -> usize {
        self.spans.values().map(Vec::len).sum()
    }
}

/// Clip the window `[line - radius, line + radius]` to a file of
/// `line_count` lines. Returns `None` when nothing of the window is left.
pub fn clip_window(line: usize, radius: usize, line_count: usize) -> Option<(usize, usize)> {
    if line_count == 0 {
        return None;
    }

    let start = line.saturating_sub(radius).max(1);
    let end = line.saturating_add(radius).min(line_count);

    (start <= end).then_some((start, end))
}

/// Number of lines in `text`, counting a final unterminated line.
pub fn line_count(text: &str) -> usize {
    text.split_inclusive('\n').count()
}

/// Slice lines `start..=end` (1-based) out of `text`, keeping terminators.
pub fn extract_lines(text: &str, start: usize, end: usize) -> String {
    if start == 0 || start > end {
        return String::new();
    }

    text.split_inclusive('\n')
        .skip(start - 1)
        .take(end - start + 1)
        .collect()
}

#[cfg(test)]
#[path = "lib/lib_tests.rs"]
mod lib_tests;
