// Context Bundler
// Merges diagnostics and located spans into a size-bounded ContextBundle

use cwhy_utils::{ContextBundle, Diagnostic, Severity, SourceSpan, SpanOrigin};
use std::collections::{BTreeMap, BTreeSet};

/// Index of the first diagnostic that points into `span`.
///
/// Spans no diagnostic points into sort after every referenced span.
pub fn first_reference(diagnostics: &[Diagnostic], span: &SourceSpan) -> usize {
    diagnostics
        .iter()
        .position(|d| d.file_path == span.file_path && span.contains_line(d.line))
        .unwrap_or(usize::MAX)
}

/// File whose spans always survive truncation: the file of the first
/// error, or of the first diagnostic when the output has no errors.
pub fn primary_file(diagnostics: &[Diagnostic]) -> Option<&str> {
    diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .or_else(|| diagnostics.first())
        .map(|d| d.file_path.as_str())
}

/// Spans in the order they were added: by first referencing diagnostic,
/// then by file and line for determinism.
pub fn spans_in_diagnostic_order<'a>(
    diagnostics: &[Diagnostic],
    spans_by_file: &'a BTreeMap<String, Vec<SourceSpan>>,
) -> Vec<&'a SourceSpan> {
    let mut ordered: Vec<(usize, &SourceSpan)> = spans_by_file
        .values()
        .flatten()
        .map(|span| (first_reference(diagnostics, span), span))
        .collect();

    ordered.sort_by(|(rank_a, a), (rank_b, b)| {
        rank_a
            .cmp(rank_b)
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| a.start_line.cmp(&b.start_line))
    });

    ordered.into_iter().map(|(_, span)| span).collect()
}

/// Build a bundle whose span text fits in `byte_budget` bytes.
///
/// When the budget is exceeded, spans are dropped in a fixed order:
/// external spans first, then project spans, each most recently added
/// first. Spans of the primary file are never dropped. Because the drop
/// order does not depend on the budget, a larger budget never loses a
/// span that a smaller one kept.
pub fn bundle(
    diagnostics: &[Diagnostic],
    spans_by_file: &BTreeMap<String, Vec<SourceSpan>>,
    byte_budget: usize,
) -> ContextBundle {
    let primary = primary_file(diagnostics);
    let added = spans_in_diagnostic_order(diagnostics, spans_by_file);

    let droppable = |origin: SpanOrigin| {
        added
            .iter()
            .rev()
            .filter(move |span| span.origin == origin && Some(span.file_path.as_str()) != primary)
    };
    let drop_order: Vec<&SourceSpan> = droppable(SpanOrigin::External)
        .chain(droppable(SpanOrigin::Project))
        .copied()
        .collect();

    let mut total: usize = added.iter().map(|span| span.byte_len()).sum();
    let mut dropped: BTreeSet<(&str, usize)> = BTreeSet::new();

    for span in drop_order {
        if total <= byte_budget {
            break;
        }
        total -= span.byte_len();
        dropped.insert((span.file_path.as_str(), span.start_line));
    }

    let mut spans: BTreeMap<String, Vec<SourceSpan>> = BTreeMap::new();
    for (file_path, file_spans) in spans_by_file {
        let kept: Vec<SourceSpan> = file_spans
            .iter()
            .filter(|span| !dropped.contains(&(span.file_path.as_str(), span.start_line)))
            .cloned()
            .collect();
        if !kept.is_empty() {
            spans.insert(file_path.clone(), kept);
        }
    }

    let truncated = !dropped.is_empty() || total > byte_budget;
    if truncated {
        log::debug!(
            "Dropped {} span(s); {} of {} budget bytes used",
            dropped.len(),
            total,
            byte_budget
        );
    }

    ContextBundle {
        diagnostics: diagnostics.to_vec(),
        spans,
        truncated,
    }
}

#[cfg(test)]
#[path = "context_bundler/context_bundler_tests.rs"]
mod context_bundler_tests;
