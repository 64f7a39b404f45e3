// Source Locator
// Loads the files referenced by diagnostics and slices context windows out of them

use crate::error::Degradation;
use cwhy_utils::{Diagnostic, SourceSpan, SpanOrigin, clip_window, extract_lines, line_count};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Read-only access to the source files a build referenced.
pub trait SourceProvider: Sync {
    /// Root of the user's project; anything outside it is external
    fn project_root(&self) -> &Path;

    /// Read a file given its resolved (absolute, normalized) path
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads sources from the host filesystem
#[derive(Debug, Clone)]
pub struct DiskSource {
    root: PathBuf,
}

impl DiskSource {
    /// Relative roots are made absolute against the working directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: normalize(&absolute),
        }
    }
}

impl SourceProvider for DiskSource {
    fn project_root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        // Headers are not guaranteed to be UTF-8
        let bytes = fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Serves sources pinned in memory, keyed by `source_key`.
///
/// Used to replay fixtures without touching the live disk.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    root: PathBuf,
    files: BTreeMap<String, String>,
}

impl MemorySource {
    pub fn new(root: impl AsRef<Path>, files: BTreeMap<String, String>) -> Self {
        Self {
            root: normalize(root.as_ref()),
            files,
        }
    }
}

impl SourceProvider for MemorySource {
    fn project_root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        let key = source_key(&self.root, path);
        self.files.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not pinned in this source set", key),
            )
        })
    }
}

/// Resolve a path as written in a diagnostic against the project root
pub fn resolve_path(root: &Path, file_path: &str) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

/// Whether a resolved path belongs to the project or lives outside it
pub fn origin_of(root: &Path, resolved: &Path) -> SpanOrigin {
    if resolved.starts_with(root) {
        SpanOrigin::Project
    } else {
        SpanOrigin::External
    }
}

/// Stable, slash-separated key under which a resolved source is pinned.
///
/// Project files are keyed by their path relative to the root; anything
/// else goes under `external/` followed by its absolute path.
pub fn source_key(root: &Path, resolved: &Path) -> String {
    match resolved.strip_prefix(root) {
        Ok(relative) => slash_join(relative),
        Err(_) => format!("external/{}", slash_join(resolved)),
    }
}

fn slash_join(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically normalize a path, dropping `.` and folding `..`
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Spans extracted for a set of diagnostics, plus the files that could not be read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocateReport {
    pub spans: BTreeMap<String, Vec<SourceSpan>>,
    pub degradations: Vec<Degradation>,
}

struct LoadedSource {
    text: String,
    lines: usize,
    origin: SpanOrigin,
}

/// Compute non-overlapping context spans for every readable file that at
/// least one diagnostic references.
///
/// Unreadable files are skipped; their diagnostics simply end up without a
/// span.
pub fn locate(
    diagnostics: &[Diagnostic],
    source: &dyn SourceProvider,
    context_lines: usize,
) -> LocateReport {
    let root = source.project_root();
    let mut loaded: HashMap<&str, Option<LoadedSource>> = HashMap::new();
    let mut windows: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
    let mut degradations = Vec::new();

    for diagnostic in diagnostics {
        let file_path = diagnostic.file_path.as_str();
        let entry = loaded.entry(file_path).or_insert_with(|| {
            let resolved = resolve_path(root, file_path);
            match source.read(&resolved) {
                Ok(text) => Some(LoadedSource {
                    lines: line_count(&text),
                    origin: origin_of(root, &resolved),
                    text,
                }),
                Err(err) => {
                    log::warn!("Skipping unreadable source {}: {}", file_path, err);
                    degradations.push(Degradation::SourceUnreadable {
                        path: file_path.to_string(),
                        reason: err.to_string(),
                    });
                    None
                }
            }
        });

        let Some(file) = entry else {
            continue;
        };

        match clip_window(diagnostic.line, context_lines, file.lines) {
            Some(window) => windows.entry(file_path).or_default().push(window),
            None => log::debug!(
                "{}:{} lies outside the file ({} lines)",
                file_path,
                diagnostic.line,
                file.lines
            ),
        }
    }

    let mut spans = BTreeMap::new();
    for (file_path, ranges) in windows {
        let Some(Some(file)) = loaded.get(file_path) else {
            continue;
        };

        let file_spans: Vec<SourceSpan> = merge_ranges(ranges)
            .into_iter()
            .map(|(start_line, end_line)| SourceSpan {
                file_path: file_path.to_string(),
                start_line,
                end_line,
                origin: file.origin,
                text: extract_lines(&file.text, start_line, end_line),
            })
            .collect();

        spans.insert(file_path.to_string(), file_spans);
    }

    log::debug!(
        "Located {} span(s) across {} file(s)",
        spans.values().map(Vec::len).sum::<usize>(),
        spans.len()
    );

    LocateReport {
        spans,
        degradations,
    }
}

/// Sort line ranges and merge the ones that overlap or touch
pub fn merge_ranges(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}
