use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for fixture store operations
pub type FixtureResult<T> = Result<T, FixtureError>;

/// Caller-visible failures of the fixture store
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Fixture '{id}' not found")]
    NotFound { id: String },

    #[error("Fixture '{id}' already exists with different content")]
    AlreadyExists { id: String },

    #[error("Fixture '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Fixture '{id}' cannot be stored: {reason}")]
    Invalid { id: String, reason: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FixtureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FixtureError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        FixtureError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Non-fatal degradation recorded while building a context bundle.
///
/// These are never raised; they travel next to the bundle in a
/// `BuildReport` and are logged as warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    #[error("no recognizable diagnostics in {lines} line(s) of compiler output")]
    ParseDegraded { lines: usize },

    #[error("could not read {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("context exceeded the {budget} byte budget, dropped {dropped} span(s)")]
    BudgetExceeded { budget: usize, dropped: usize },
}
