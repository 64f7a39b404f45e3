use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lines of context taken on each side of a diagnostic's line
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Byte budget for all span text in a bundle
pub const DEFAULT_BYTE_BUDGET: usize = 16 * 1024;

/// Fixture store location, relative to the working directory
pub const DEFAULT_FIXTURES_DIR: &str = "tests/.regression";

/// Parameters that influence how a context bundle is built.
///
/// Stored inside every fixture so a replay uses exactly the parameters
/// the expected bundle was captured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSettings {
    pub context_lines: usize,
    pub byte_budget: usize,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            byte_budget: DEFAULT_BYTE_BUDGET,
        }
    }
}

/// Runtime configuration for the engine and the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub settings: BundleSettings,
    pub fixtures_dir: PathBuf,
    /// Worker threads for regression runs; 1 runs sequentially
    pub jobs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings: BundleSettings::default(),
            fixtures_dir: PathBuf::from(DEFAULT_FIXTURES_DIR),
            jobs: default_jobs(),
        }
    }
}

impl Config {
    /// Defaults overridden by `CWHY_*` environment variables.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(lines) = env_usize("CWHY_CONTEXT_LINES") {
            config.settings.context_lines = lines;
        }
        if let Some(budget) = env_usize("CWHY_BYTE_BUDGET") {
            config.settings.byte_budget = budget;
        }
        if let Ok(dir) = std::env::var("CWHY_FIXTURES_DIR") {
            if !dir.trim().is_empty() {
                config.fixtures_dir = PathBuf::from(dir);
            }
        }
        if let Some(jobs) = env_usize("CWHY_JOBS") {
            config.jobs = jobs.max(1);
        }

        config
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_usize(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<usize>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            log::warn!("Ignoring {}={:?}: {}", name, value, err);
            None
        }
    }
}

#[cfg(test)]
#[path = "config/config_tests.rs"]
mod config_tests;
