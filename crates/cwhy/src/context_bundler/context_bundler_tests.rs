use super::*;
use crate::diagnostic_parser::parse;
use crate::source_locator::locate;
use crate::test_support::{SOURCE, diagnostic, header_path, transform_sources, transform_stderr};
use pretty_assertions::assert_eq;

fn span(file: &str, start: usize, end: usize, origin: SpanOrigin, bytes: usize) -> SourceSpan {
    SourceSpan {
        file_path: file.to_string(),
        start_line: start,
        end_line: end,
        origin,
        text: "x".repeat(bytes),
    }
}

fn by_file(spans: Vec<SourceSpan>) -> BTreeMap<String, Vec<SourceSpan>> {
    let mut map: BTreeMap<String, Vec<SourceSpan>> = BTreeMap::new();
    for span in spans {
        map.entry(span.file_path.clone()).or_default().push(span);
    }
    map
}

fn kept(bundle: &ContextBundle) -> Vec<(String, usize)> {
    bundle
        .spans
        .values()
        .flatten()
        .map(|span| (span.file_path.clone(), span.start_line))
        .collect()
}

/// main.cpp error, two project notes in util.cpp, two external notes in vector.h
fn mixed_case() -> (Vec<Diagnostic>, BTreeMap<String, Vec<SourceSpan>>) {
    let diagnostics = vec![
        diagnostic(Severity::Error, "main.cpp", 10),
        diagnostic(Severity::Note, "/usr/include/vector.h", 100),
        diagnostic(Severity::Note, "util.cpp", 20),
        diagnostic(Severity::Note, "/usr/include/vector.h", 300),
        diagnostic(Severity::Note, "util.cpp", 80),
    ];
    let spans = by_file(vec![
        span("main.cpp", 7, 13, SpanOrigin::Project, 100),
        span("/usr/include/vector.h", 97, 103, SpanOrigin::External, 100),
        span("/usr/include/vector.h", 297, 303, SpanOrigin::External, 100),
        span("util.cpp", 17, 23, SpanOrigin::Project, 100),
        span("util.cpp", 77, 83, SpanOrigin::Project, 100),
    ]);
    (diagnostics, spans)
}

#[test]
fn test_primary_file_prefers_first_error() {
    let diagnostics = vec![
        diagnostic(Severity::Warning, "a.cpp", 1),
        diagnostic(Severity::Error, "b.cpp", 2),
    ];
    assert_eq!(primary_file(&diagnostics), Some("b.cpp"));
}

#[test]
fn test_primary_file_falls_back_to_first_diagnostic() {
    let diagnostics = vec![
        diagnostic(Severity::Warning, "a.cpp", 1),
        diagnostic(Severity::Note, "b.cpp", 2),
    ];
    assert_eq!(primary_file(&diagnostics), Some("a.cpp"));
    assert_eq!(primary_file(&[]), None);
}

#[test]
fn test_spans_in_diagnostic_order() {
    let (diagnostics, spans) = mixed_case();
    let order: Vec<(&str, usize)> = spans_in_diagnostic_order(&diagnostics, &spans)
        .into_iter()
        .map(|span| (span.file_path.as_str(), span.start_line))
        .collect();

    assert_eq!(
        order,
        vec![
            ("main.cpp", 7),
            ("/usr/include/vector.h", 97),
            ("util.cpp", 17),
            ("/usr/include/vector.h", 297),
            ("util.cpp", 77),
        ]
    );
}

#[test]
fn test_bundle_within_budget_keeps_everything() {
    let (diagnostics, spans) = mixed_case();
    let bundle = bundle(&diagnostics, &spans, 500);

    assert!(!bundle.truncated);
    assert_eq!(bundle.span_count(), 5);
    assert_eq!(bundle.diagnostics, diagnostics);
}

#[test]
fn test_bundle_drops_external_spans_most_recent_first() {
    let (diagnostics, spans) = mixed_case();
    let bundle = bundle(&diagnostics, &spans, 400);

    assert!(bundle.truncated);
    assert_eq!(
        kept(&bundle),
        vec![
            ("/usr/include/vector.h".to_string(), 97),
            ("main.cpp".to_string(), 7),
            ("util.cpp".to_string(), 17),
            ("util.cpp".to_string(), 77),
        ]
    );
}

#[test]
fn test_bundle_drops_project_spans_after_external() {
    let (diagnostics, spans) = mixed_case();
    let bundle = bundle(&diagnostics, &spans, 200);

    assert!(bundle.truncated);
    assert_eq!(
        kept(&bundle),
        vec![("main.cpp".to_string(), 7), ("util.cpp".to_string(), 17)]
    );
    assert!(!bundle.spans.contains_key("/usr/include/vector.h"));
}

#[test]
fn test_bundle_zero_budget_keeps_only_primary() {
    let (diagnostics, spans) = mixed_case();
    let bundle = bundle(&diagnostics, &spans, 0);

    assert!(bundle.truncated);
    assert_eq!(kept(&bundle), vec![("main.cpp".to_string(), 7)]);
    assert_eq!(bundle.diagnostics.len(), 5);
}

#[test]
fn test_bundle_primary_in_external_header_is_protected() {
    let diagnostics = vec![
        diagnostic(Severity::Error, "/usr/include/bits/stl_algo.h", 50),
        diagnostic(Severity::Note, "main.cpp", 3),
    ];
    let spans = by_file(vec![
        span("/usr/include/bits/stl_algo.h", 47, 53, SpanOrigin::External, 300),
        span("main.cpp", 1, 6, SpanOrigin::Project, 50),
    ]);

    let bundle = bundle(&diagnostics, &spans, 100);

    assert!(bundle.truncated);
    assert_eq!(kept(&bundle), vec![("/usr/include/bits/stl_algo.h".to_string(), 47)]);
}

#[test]
fn test_bundle_oversized_primary_is_flagged_but_kept() {
    let diagnostics = vec![diagnostic(Severity::Error, "main.cpp", 10)];
    let spans = by_file(vec![span("main.cpp", 7, 13, SpanOrigin::Project, 1000)]);

    let bundle = bundle(&diagnostics, &spans, 10);

    assert!(bundle.truncated);
    assert_eq!(bundle.span_count(), 1);
    assert_eq!(bundle.span_bytes(), 1000);
}

#[test]
fn test_bundle_is_budget_monotonic() {
    let (diagnostics, spans) = mixed_case();
    let mut previous: Option<Vec<(String, usize)>> = None;

    for budget in (0..=600).step_by(25) {
        let current = kept(&bundle(&diagnostics, &spans, budget));
        if let Some(previous) = &previous {
            for entry in previous {
                assert!(
                    current.contains(entry),
                    "budget {} lost {:?} kept at a smaller budget",
                    budget,
                    entry
                );
            }
        }
        previous = Some(current);
    }
}

#[test]
fn test_bundle_transform_scenario() {
    let diagnostics = parse(&transform_stderr());
    let located = locate(&diagnostics, &transform_sources(), 3);

    let user_bytes = located.spans[SOURCE][0].byte_len();
    let header_spans = &located.spans[&header_path()];
    let first_header_bytes = header_spans[0].byte_len();

    let roomy = bundle(&diagnostics, &located.spans, usize::MAX);
    assert!(!roomy.truncated);
    assert_eq!(roomy.span_count(), 3);

    let tight = bundle(&diagnostics, &located.spans, user_bytes + first_header_bytes);
    assert!(tight.truncated);
    assert_eq!(
        kept(&tight),
        vec![(SOURCE.to_string(), 38), (header_path(), 4329)]
    );

    let minimal = bundle(&diagnostics, &located.spans, user_bytes);
    assert!(minimal.truncated);
    assert_eq!(kept(&minimal), vec![(SOURCE.to_string(), 38)]);
}

#[test]
fn test_bundle_is_deterministic() {
    let diagnostics = parse(&transform_stderr());
    let located = locate(&diagnostics, &transform_sources(), 3);

    let first = bundle(&diagnostics, &located.spans, 700);
    let second = bundle(&diagnostics, &located.spans, 700);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string_pretty(&first).unwrap(),
        serde_json::to_string_pretty(&second).unwrap()
    );
}
