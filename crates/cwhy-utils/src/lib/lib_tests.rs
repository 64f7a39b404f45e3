use super::*;

fn diagnostic(path: &str, line: usize) -> Diagnostic {
    Diagnostic {
        severity: Severity::Error,
        file_path: path.to_string(),
        line,
        column: Some(5),
        message: "expected ';'".to_string(),
        raw_text: String::new(),
    }
}

fn span(path: &str, start: usize, end: usize, text: &str) -> SourceSpan {
    SourceSpan {
        file_path: path.to_string(),
        start_line: start,
        end_line: end,
        origin: SpanOrigin::Project,
        text: text.to_string(),
    }
}

#[test]
fn test_severity_from_label() {
    assert_eq!(Severity::from_label("error"), Some(Severity::Error));
    assert_eq!(Severity::from_label("fatal error"), Some(Severity::Error));
    assert_eq!(Severity::from_label("warning"), Some(Severity::Warning));
    assert_eq!(Severity::from_label(" note "), Some(Severity::Note));
    assert_eq!(Severity::from_label("remark"), None);
}

#[test]
fn test_diagnostic_display_with_and_without_column() {
    let mut d = diagnostic("main.cpp", 41);
    assert_eq!(d.to_string(), "main.cpp:41:5: error: expected ';'");

    d.column = None;
    assert_eq!(d.to_string(), "main.cpp:41: error: expected ';'");
}

#[test]
fn test_diagnostic_serialization_skips_missing_column() {
    let mut d = diagnostic("main.cpp", 3);
    d.column = None;

    let json = serde_json::to_string(&d).unwrap();
    assert!(!json.contains("column"));
    assert!(json.contains("\"severity\":\"error\""));

    let back: Diagnostic = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}

#[test]
fn test_clip_window_inside_file() {
    assert_eq!(clip_window(10, 3, 100), Some((7, 13)));
}

#[test]
fn test_clip_window_at_edges() {
    assert_eq!(clip_window(1, 3, 100), Some((1, 4)));
    assert_eq!(clip_window(41, 3, 42), Some((38, 42)));
    assert_eq!(clip_window(0, 2, 5), Some((1, 2)));
}

#[test]
fn test_clip_window_outside_file() {
    assert_eq!(clip_window(50, 3, 10), None);
    assert_eq!(clip_window(1, 3, 0), None);
}

#[test]
fn test_line_count() {
    assert_eq!(line_count(""), 0);
    assert_eq!(line_count("a"), 1);
    assert_eq!(line_count("a\nb\n"), 2);
    assert_eq!(line_count("a\nb\nc"), 3);
}

#[test]
fn test_extract_lines_keeps_terminators() {
    let text = "one\ntwo\nthree\nfour";
    assert_eq!(extract_lines(text, 2, 3), "two\nthree\n");
    assert_eq!(extract_lines(text, 4, 9), "four");
    assert_eq!(extract_lines(text, 3, 2), "");
}

#[test]
fn test_span_for_finds_covering_span() {
    let mut bundle = ContextBundle::default();
    bundle.spans.insert(
        "main.cpp".to_string(),
        vec![span("main.cpp", 1, 4, "a\n"), span("main.cpp", 38, 42, "b\n")],
    );

    let found = bundle.span_for(&diagnostic("main.cpp", 41)).unwrap();
    assert_eq!(found.start_line, 38);

    assert!(bundle.span_for(&diagnostic("main.cpp", 20)).is_none());
    assert!(bundle.span_for(&diagnostic("other.cpp", 2)).is_none());
}

#[test]
fn test_span_bytes_and_count() {
    let mut bundle = ContextBundle::default();
    bundle.spans.insert("a.cpp".to_string(), vec![span("a.cpp", 1, 1, "12345")]);
    bundle.spans.insert("b.h".to_string(), vec![span("b.h", 1, 2, "abc"), span("b.h", 9, 9, "d")]);

    assert_eq!(bundle.span_bytes(), 9);
    assert_eq!(bundle.span_count(), 3);
}
