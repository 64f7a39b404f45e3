// Regression Runner
// Replays stored fixtures and diffs the rebuilt bundle against the recorded one

use crate::error::FixtureResult;
use crate::fixture_store::{Fixture, FixtureFilter, FixtureStore};
use crate::pipeline::ContextBuilder;
use cwhy_utils::{ContextBundle, Diagnostic, SourceSpan};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// One difference between an expected and an actual sequence.
///
/// `index` points into the actual sequence for `Added` and into the
/// expected sequence for `Removed` and `Changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change<T> {
    Added { index: usize, actual: T },
    Removed { index: usize, expected: T },
    Changed { index: usize, expected: T, actual: T },
}

impl<T> Change<T> {
    pub fn index(&self) -> usize {
        match self {
            Change::Added { index, .. }
            | Change::Removed { index, .. }
            | Change::Changed { index, .. } => *index,
        }
    }
}

/// Align two sequences on their longest common subsequence and report
/// what lies between the matched elements.
///
/// Inside each unmatched stretch, elements are paired up in order as
/// `Changed`; the surplus on either side is `Removed` or `Added`.
fn diff_sequence<T: PartialEq + Clone>(expected: &[T], actual: &[T]) -> Vec<Change<T>> {
    let (n, m) = (expected.len(), actual.len());

    // common[i][j]: LCS length of expected[i..] and actual[j..]
    let mut common = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            common[i][j] = if expected[i] == actual[j] {
                common[i + 1][j + 1] + 1
            } else {
                common[i + 1][j].max(common[i][j + 1])
            };
        }
    }

    let mut changes = Vec::new();
    let mut removed = Vec::new();
    let mut added = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < n || j < m {
        if i < n && j < m && expected[i] == actual[j] {
            flush_stretch(expected, actual, &mut removed, &mut added, &mut changes);
            i += 1;
            j += 1;
        } else if i < n && (j == m || common[i + 1][j] >= common[i][j + 1]) {
            removed.push(i);
            i += 1;
        } else {
            added.push(j);
            j += 1;
        }
    }
    flush_stretch(expected, actual, &mut removed, &mut added, &mut changes);

    changes
}

fn flush_stretch<T: Clone>(
    expected: &[T],
    actual: &[T],
    removed: &mut Vec<usize>,
    added: &mut Vec<usize>,
    changes: &mut Vec<Change<T>>,
) {
    let paired = removed.len().min(added.len());

    for (&e, &a) in removed.iter().zip(added.iter()) {
        changes.push(Change::Changed {
            index: e,
            expected: expected[e].clone(),
            actual: actual[a].clone(),
        });
    }
    for &e in &removed[paired..] {
        changes.push(Change::Removed {
            index: e,
            expected: expected[e].clone(),
        });
    }
    for &a in &added[paired..] {
        changes.push(Change::Added {
            index: a,
            actual: actual[a].clone(),
        });
    }

    removed.clear();
    added.clear();
}

/// Structural difference between an expected and an actual bundle.
///
/// Empty when the bundles are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleDiff {
    pub diagnostics: Vec<Change<Diagnostic>>,
    pub spans: BTreeMap<String, Vec<Change<SourceSpan>>>,
    /// (expected, actual) when the flags differ
    pub truncated: Option<(bool, bool)>,
    /// Set when the fixture could not be replayed at all
    pub error: Option<String>,
}

impl BundleDiff {
    pub fn between(expected: &ContextBundle, actual: &ContextBundle) -> Self {
        let diagnostics = diff_sequence(&expected.diagnostics, &actual.diagnostics);

        let files: BTreeSet<&String> = expected.spans.keys().chain(actual.spans.keys()).collect();
        let mut spans = BTreeMap::new();
        for file in files {
            let expected_spans = expected.spans.get(file).map(Vec::as_slice).unwrap_or_default();
            let actual_spans = actual.spans.get(file).map(Vec::as_slice).unwrap_or_default();
            let changes = diff_sequence(expected_spans, actual_spans);
            if !changes.is_empty() {
                spans.insert(file.clone(), changes);
            }
        }

        let truncated =
            (expected.truncated != actual.truncated).then_some((expected.truncated, actual.truncated));

        Self {
            diagnostics,
            spans,
            truncated,
            error: None,
        }
    }

    pub fn failure(error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
            && self.spans.is_empty()
            && self.truncated.is_none()
            && self.error.is_none()
    }
}

fn span_range(span: &SourceSpan) -> String {
    format!("lines {}-{} ({} bytes)", span.start_line, span.end_line, span.byte_len())
}

impl fmt::Display for BundleDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            writeln!(f, "error: {}", error)?;
        }

        for change in &self.diagnostics {
            write!(f, "diagnostic #{}: ", change.index())?;
            match change {
                Change::Added { actual, .. } => writeln!(f, "+ {}", actual)?,
                Change::Removed { expected, .. } => writeln!(f, "- {}", expected)?,
                Change::Changed {
                    expected, actual, ..
                } => writeln!(f, "- {}\n  + {}", expected, actual)?,
            }
        }

        for (file, changes) in &self.spans {
            for change in changes {
                write!(f, "span {} #{}: ", file, change.index())?;
                match change {
                    Change::Added { actual, .. } => writeln!(f, "+ {}", span_range(actual))?,
                    Change::Removed { expected, .. } => writeln!(f, "- {}", span_range(expected))?,
                    Change::Changed {
                        expected, actual, ..
                    } if expected.start_line == actual.start_line
                        && expected.end_line == actual.end_line =>
                    {
                        writeln!(f, "text changed in {}", span_range(actual))?
                    }
                    Change::Changed {
                        expected, actual, ..
                    } => writeln!(f, "- {}\n  + {}", span_range(expected), span_range(actual))?,
                }
            }
        }

        if let Some((expected, actual)) = self.truncated {
            writeln!(f, "truncated: expected {}, actual {}", expected, actual)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegressionResult {
    pub fixture_id: String,
    pub passed: bool,
    pub diff: BundleDiff,
}

impl RegressionResult {
    /// A result for a fixture that could not be replayed
    pub fn failed(fixture_id: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            fixture_id: fixture_id.into(),
            passed: false,
            diff: BundleDiff::failure(error),
        }
    }
}

/// Rebuild a fixture's bundle from its pinned inputs and compare
pub fn run_one(fixture: &Fixture) -> RegressionResult {
    let report = ContextBuilder::new(fixture.settings).build(&fixture.raw_stderr, &fixture.sources());
    let diff = BundleDiff::between(&fixture.expected_bundle, &report.bundle);
    let passed = diff.is_empty();

    if passed {
        log::debug!("{} passed", fixture.id);
    } else {
        log::info!("{} failed:\n{}", fixture.id, diff);
    }

    RegressionResult {
        fixture_id: fixture.id.clone(),
        passed,
        diff,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("replay panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("replay panicked: {}", message)
    } else {
        "replay panicked".to_string()
    }
}

/// Replays fixtures, in parallel when more than one job is allowed.
///
/// Fixtures are independent; a failing or panicking fixture never stops
/// the others. Results always come back sorted by fixture id.
#[derive(Debug, Clone, Copy)]
pub struct RegressionRunner {
    jobs: usize,
}

impl RegressionRunner {
    pub fn new(jobs: usize) -> Self {
        Self { jobs: jobs.max(1) }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn run(&self, fixtures: &[Fixture]) -> Vec<RegressionResult> {
        self.execute(fixtures, |fixture| fixture.id.clone(), run_one)
    }

    /// Load and replay every fixture in `store` matching `filter`.
    ///
    /// A fixture that fails to load is reported as a failed result.
    pub fn run_store(
        &self,
        store: &FixtureStore,
        filter: &FixtureFilter,
    ) -> FixtureResult<Vec<RegressionResult>> {
        let ids = store.ids(filter)?;
        log::info!("Replaying {} fixture(s) from {}", ids.len(), store.root().display());

        Ok(self.execute(&ids, |id: &String| id.clone(), |id| match store.load(id) {
            Ok(fixture) => run_one(&fixture),
            Err(err) => RegressionResult::failed(id.clone(), err),
        }))
    }

    fn execute<T, I, J>(&self, items: &[T], id_of: I, job: J) -> Vec<RegressionResult>
    where
        T: Sync,
        I: Fn(&T) -> String + Sync,
        J: Fn(&T) -> RegressionResult + Sync,
    {
        let guarded = |item: &T| match panic::catch_unwind(AssertUnwindSafe(|| job(item))) {
            Ok(result) => result,
            Err(payload) => RegressionResult::failed(id_of(item), panic_message(payload.as_ref())),
        };

        let mut results: Vec<RegressionResult> = if self.jobs == 1 || items.len() <= 1 {
            items.iter().map(guarded).collect()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => pool.install(|| items.par_iter().map(guarded).collect()),
                Err(err) => {
                    log::warn!("Falling back to sequential replay: {}", err);
                    items.iter().map(guarded).collect()
                }
            }
        };

        results.sort_by(|a, b| a.fixture_id.cmp(&b.fixture_id));
        results
    }
}

impl Default for RegressionRunner {
    fn default() -> Self {
        Self::new(1)
    }
}
