mod config;
mod context_bundler;
mod diagnostic_parser;
mod error;
mod fixture_store;
mod pipeline;
mod prompt;
mod regression_runner;
mod source_locator;

#[cfg(test)]
mod test_support;

pub use config::{BundleSettings, Config, DEFAULT_BYTE_BUDGET, DEFAULT_CONTEXT_LINES, DEFAULT_FIXTURES_DIR};
pub use context_bundler::{bundle, primary_file, spans_in_diagnostic_order};
pub use diagnostic_parser::{DiagnosticLine, HeaderLine, ParseReport, classify_line, parse, parse_report, strip_ansi};
pub use error::{Degradation, FixtureError, FixtureResult};
pub use fixture_store::{CaptureRequest, Fixture, FixtureFilter, FixtureStore, capture, fixture_id};
pub use pipeline::{BuildReport, ContextBuilder};
pub use prompt::{ELISION_MARKER, PromptOptions, elide_middle, render_prompt};
pub use regression_runner::{BundleDiff, Change, RegressionResult, RegressionRunner, run_one};
pub use source_locator::{DiskSource, LocateReport, MemorySource, SourceProvider, locate, merge_ranges, resolve_path, source_key};

pub use cwhy_utils::{ContextBundle, Diagnostic, Severity, SourceSpan, SpanOrigin};
