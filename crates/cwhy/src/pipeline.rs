use crate::config::BundleSettings;
use crate::context_bundler::bundle;
use crate::diagnostic_parser::parse_report;
use crate::error::Degradation;
use crate::source_locator::{SourceProvider, locate};
use cwhy_utils::ContextBundle;

/// A context bundle together with everything that degraded while building it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub bundle: ContextBundle,
    pub degradations: Vec<Degradation>,
}

/// Runs parse, locate and bundle over one compiler run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder {
    settings: BundleSettings,
}

impl ContextBuilder {
    pub fn new(settings: BundleSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> BundleSettings {
        self.settings
    }

    /// Build the bundle for `raw_stderr`, reading sources from `source`.
    ///
    /// Never fails; every problem is recorded as a degradation and logged.
    pub fn build(&self, raw_stderr: &str, source: &dyn SourceProvider) -> BuildReport {
        let parsed = parse_report(raw_stderr);
        let mut degradations: Vec<Degradation> = parsed.degradation.into_iter().collect();

        let located = locate(&parsed.diagnostics, source, self.settings.context_lines);
        degradations.extend(located.degradations);

        let located_count: usize = located.spans.values().map(Vec::len).sum();
        let bundle = bundle(&parsed.diagnostics, &located.spans, self.settings.byte_budget);

        if bundle.truncated {
            degradations.push(Degradation::BudgetExceeded {
                budget: self.settings.byte_budget,
                dropped: located_count.saturating_sub(bundle.span_count()),
            });
        }

        for degradation in &degradations {
            log::warn!("{}", degradation);
        }

        log::debug!(
            "Bundle has {} diagnostic(s), {} span(s), {} byte(s)",
            bundle.diagnostics.len(),
            bundle.span_count(),
            bundle.span_bytes()
        );

        BuildReport {
            bundle,
            degradations,
        }
    }
}
