// Shared inputs for unit tests: the g++-9 std::transform overload failure

use crate::source_locator::MemorySource;
use cwhy_utils::{Diagnostic, Severity};
use std::collections::BTreeMap;

pub const PROJECT_ROOT: &str = "/home/runner/work/cwhy/cwhy";
pub const SOURCE: &str = "/home/runner/work/cwhy/cwhy/tests/c++/overload-resolution-failure-transform-missing-argument.cpp";
pub const SOURCE_KEY: &str = "tests/c++/overload-resolution-failure-transform-missing-argument.cpp";
pub const INCLUDE: &str = "/usr/include/c++/9";
pub const HEADER_KEY: &str = "external/usr/include/c++/9/bits/stl_algo.h";

pub fn header_path() -> String {
    format!("{}/bits/stl_algo.h", INCLUDE)
}

pub fn transform_stderr() -> String {
    include_str!("../test_fixtures/transform_missing_argument.stderr")
        .replace("@SOURCE@", SOURCE)
        .replace("@INCLUDE@", INCLUDE)
}

pub fn user_source() -> &'static str {
    include_str!("../test_fixtures/transform_missing_argument.cpp")
}

/// stl_algo.h with the real text at lines 4325..=4372
pub fn stl_algo_header() -> String {
    let mut text = String::new();
    for n in 1..4325 {
        text.push_str(&format!("// line {}\n", n));
    }
    text.push_str(include_str!("../test_fixtures/stl_algo_4325_4372.h"));
    text
}

pub fn transform_source_files() -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    files.insert(SOURCE_KEY.to_string(), user_source().to_string());
    files.insert(HEADER_KEY.to_string(), stl_algo_header());
    files
}

pub fn transform_sources() -> MemorySource {
    MemorySource::new(PROJECT_ROOT, transform_source_files())
}

pub fn diagnostic(severity: Severity, file_path: &str, line: usize) -> Diagnostic {
    Diagnostic {
        severity,
        file_path: file_path.to_string(),
        line,
        column: None,
        message: format!("{} at line {}", severity, line),
        raw_text: format!("{}:{}: {}: at line {}", file_path, line, severity, line),
    }
}
