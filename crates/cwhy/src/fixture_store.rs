// Fixture Store
// Persists captured regression cases under {os}/{compiler}-{version}/{test}

use crate::config::BundleSettings;
use crate::diagnostic_parser::parse;
use crate::error::{FixtureError, FixtureResult};
use crate::pipeline::ContextBuilder;
use crate::source_locator::{DiskSource, MemorySource, SourceProvider, resolve_path, source_key};
use cwhy_utils::ContextBundle;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = "fixture.json";
const STDERR_FILE: &str = "stderr.txt";
const EXPECTED_FILE: &str = "expected.json";
const SOURCES_DIR: &str = "sources";

/// A captured, immutable regression case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub test_name: String,
    pub os_name: String,
    pub compiler_name: String,
    pub compiler_version: String,
    /// Project root at capture time; maps diagnostic paths onto `source_files`
    pub project_root: String,
    pub settings: BundleSettings,
    /// Pinned file contents keyed by `source_key`
    pub source_files: BTreeMap<String, String>,
    pub raw_stderr: String,
    pub expected_bundle: ContextBundle,
}

impl Fixture {
    /// The pinned sources, served without touching the disk
    pub fn sources(&self) -> MemorySource {
        MemorySource::new(&self.project_root, self.source_files.clone())
    }
}

/// On-disk metadata, written last so its presence marks a complete fixture
#[derive(Debug, Clone, Deserialize, Serialize)]
struct FixtureMetadata {
    id: String,
    test_name: String,
    os_name: String,
    compiler_name: String,
    compiler_version: String,
    project_root: String,
    settings: BundleSettings,
    sources: Vec<String>,
    checksum: String,
}

/// Restricts `ids` and `list` to one OS and/or compiler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureFilter {
    pub os: Option<String>,
    pub compiler: Option<String>,
}

impl FixtureFilter {
    /// Match against the directory names of a stored fixture, so that a
    /// fixture with unreadable metadata is still selected and reported.
    fn matches(&self, os_dir: &str, compiler_dir: &str) -> bool {
        let compiler = compiler_dir
            .split_once('-')
            .map_or(compiler_dir, |(compiler, _)| compiler);

        self.os
            .as_ref()
            .is_none_or(|os| encode_segment(os, SegmentKind::Plain) == os_dir)
            && self
                .compiler
                .as_ref()
                .is_none_or(|name| encode_segment(name, SegmentKind::Compiler) == compiler)
    }
}

/// Derive the stable id of a fixture.
///
/// The id doubles as its relative directory: `{os}/{compiler}-{version}/{test}`.
/// Each segment is escaped so that distinct inputs never share a directory:
/// `-` is escaped in the compiler name, which makes the first `-` of the
/// middle segment the separator.
pub fn fixture_id(
    os_name: &str,
    compiler_name: &str,
    compiler_version: &str,
    test_name: &str,
) -> String {
    format!(
        "{}/{}-{}/{}",
        encode_segment(os_name, SegmentKind::Plain),
        encode_segment(compiler_name, SegmentKind::Compiler),
        encode_segment(compiler_version, SegmentKind::Plain),
        encode_segment(test_name, SegmentKind::Plain)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    Plain,
    Compiler,
}

/// Percent-escape everything outside a portable file-name alphabet.
///
/// A leading `.` is escaped too, so no segment is hidden, `.` or `..`.
/// The empty segment becomes a lone `%`, which no other input produces.
fn encode_segment(segment: &str, kind: SegmentKind) -> String {
    if segment.is_empty() {
        return "%".to_string();
    }

    let mut encoded = String::with_capacity(segment.len());
    for (position, c) in segment.chars().enumerate() {
        let plain = c.is_ascii_alphanumeric()
            || matches!(c, '+' | '_' | '=' | ',')
            || (c == '.' && position > 0)
            || (c == '-' && kind == SegmentKind::Plain);

        if plain {
            encoded.push(c);
        } else {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(encoded, "%{:02X}", byte);
            }
        }
    }
    encoded
}

/// A relative, slash-separated path that cannot escape its parent directory
fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains(':'))
}

/// Directory-backed store of regression fixtures
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fixture_dir(&self, id: &str) -> PathBuf {
        id.split('/').fold(self.root.clone(), |dir, part| dir.join(part))
    }

    /// Store a fixture.
    ///
    /// Saving a fixture identical to the stored one is a no-op; saving
    /// different content under an existing id fails with `AlreadyExists`.
    pub fn save(&self, fixture: &Fixture) -> FixtureResult<PathBuf> {
        let expected_id = fixture_id(
            &fixture.os_name,
            &fixture.compiler_name,
            &fixture.compiler_version,
            &fixture.test_name,
        );
        if fixture.id != expected_id {
            return Err(FixtureError::Invalid {
                id: fixture.id.clone(),
                reason: format!("id does not match its fields, expected '{}'", expected_id),
            });
        }
        if let Some(key) = fixture.source_files.keys().find(|key| !is_safe_relative(key)) {
            return Err(FixtureError::Invalid {
                id: fixture.id.clone(),
                reason: format!("source key '{}' is not a safe relative path", key),
            });
        }

        let dir = self.fixture_dir(&fixture.id);

        match self.load(&fixture.id) {
            Ok(existing) if existing == *fixture => {
                log::info!("Fixture {} is already stored", fixture.id);
                return Ok(dir);
            }
            Err(FixtureError::NotFound { .. }) => {}
            Ok(_) => {
                return Err(FixtureError::AlreadyExists {
                    id: fixture.id.clone(),
                });
            }
            // fixture.json exists but the rest cannot be read back
            Err(err) => {
                log::warn!("Stored fixture {} is unreadable: {}", fixture.id, err);
                return Err(FixtureError::AlreadyExists {
                    id: fixture.id.clone(),
                });
            }
        }

        // Leftovers of an interrupted save
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|err| FixtureError::io(&dir, err))?;
        }

        let expected_path = dir.join(EXPECTED_FILE);
        let expected_json = serde_json::to_string_pretty(&fixture.expected_bundle)
            .map_err(|err| FixtureError::json(&expected_path, err))?;

        for (key, contents) in &fixture.source_files {
            write_file(&dir.join(SOURCES_DIR).join(key), contents)?;
        }
        write_file(&dir.join(STDERR_FILE), &fixture.raw_stderr)?;
        write_file(&expected_path, &expected_json)?;

        let metadata = FixtureMetadata {
            id: fixture.id.clone(),
            test_name: fixture.test_name.clone(),
            os_name: fixture.os_name.clone(),
            compiler_name: fixture.compiler_name.clone(),
            compiler_version: fixture.compiler_version.clone(),
            project_root: fixture.project_root.clone(),
            settings: fixture.settings,
            sources: fixture.source_files.keys().cloned().collect(),
            checksum: String::new(),
        };
        let metadata = FixtureMetadata {
            checksum: compute_checksum(
                &metadata,
                &fixture.raw_stderr,
                &expected_json,
                &fixture.source_files,
            ),
            ..metadata
        };

        let metadata_path = dir.join(METADATA_FILE);
        let metadata_json = serde_json::to_string_pretty(&metadata)
            .map_err(|err| FixtureError::json(&metadata_path, err))?;
        write_file(&metadata_path, &metadata_json)?;

        log::info!("Saved fixture {} to {}", fixture.id, dir.display());
        Ok(dir)
    }

    /// Load a fixture by id, verifying its checksum
    pub fn load(&self, id: &str) -> FixtureResult<Fixture> {
        let not_found = || FixtureError::NotFound { id: id.to_string() };

        if !is_safe_relative(id) {
            return Err(not_found());
        }

        let dir = self.fixture_dir(id);
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            return Err(not_found());
        }

        let metadata: FixtureMetadata = read_json(&metadata_path)?;
        if metadata.id != id {
            return Err(FixtureError::Corrupt {
                id: id.to_string(),
                reason: format!("metadata names fixture '{}'", metadata.id),
            });
        }

        let raw_stderr = read_file(&dir.join(STDERR_FILE))?;
        let expected_path = dir.join(EXPECTED_FILE);
        let expected_json = read_file(&expected_path)?;

        let mut source_files = BTreeMap::new();
        for key in &metadata.sources {
            if !is_safe_relative(key) {
                return Err(FixtureError::Corrupt {
                    id: id.to_string(),
                    reason: format!("source key '{}' escapes the fixture", key),
                });
            }
            let contents = read_file(&dir.join(SOURCES_DIR).join(key))?;
            source_files.insert(key.clone(), contents);
        }

        let actual = compute_checksum(&metadata, &raw_stderr, &expected_json, &source_files);
        if actual != metadata.checksum {
            return Err(FixtureError::Corrupt {
                id: id.to_string(),
                reason: format!(
                    "checksum mismatch (expected {}, actual {})",
                    metadata.checksum, actual
                ),
            });
        }

        let expected_bundle: ContextBundle = serde_json::from_str(&expected_json)
            .map_err(|err| FixtureError::json(&expected_path, err))?;

        log::debug!("Loaded fixture {}", id);

        Ok(Fixture {
            id: metadata.id,
            test_name: metadata.test_name,
            os_name: metadata.os_name,
            compiler_name: metadata.compiler_name,
            compiler_version: metadata.compiler_version,
            project_root: metadata.project_root,
            settings: metadata.settings,
            source_files,
            raw_stderr,
            expected_bundle,
        })
    }

    /// Ids of every stored fixture matching `filter`, sorted.
    ///
    /// Ids come from the directory layout; metadata is only read by `load`,
    /// so a damaged fixture is still listed.
    pub fn ids(&self, filter: &FixtureFilter) -> FixtureResult<Vec<String>> {
        let mut ids = Vec::new();

        for os_dir in sorted_subdirs(&self.root)? {
            let os_name = dir_name(&os_dir);
            for compiler_dir in sorted_subdirs(&os_dir)? {
                let compiler_name = dir_name(&compiler_dir);
                if !filter.matches(&os_name, &compiler_name) {
                    continue;
                }
                for test_dir in sorted_subdirs(&compiler_dir)? {
                    if test_dir.join(METADATA_FILE).is_file() {
                        ids.push(format!("{}/{}/{}", os_name, compiler_name, dir_name(&test_dir)));
                    }
                }
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Every stored fixture matching `filter`, sorted by id
    pub fn list(&self, filter: &FixtureFilter) -> FixtureResult<Vec<Fixture>> {
        self.ids(filter)?.iter().map(|id| self.load(id)).collect()
    }
}

/// Inputs of a live compiler run to be turned into a fixture
#[derive(Debug, Clone)]
pub struct CaptureRequest<'a> {
    pub test_name: &'a str,
    pub os_name: &'a str,
    pub compiler_name: &'a str,
    pub compiler_version: &'a str,
    pub project_root: &'a Path,
    pub raw_stderr: &'a str,
    pub settings: BundleSettings,
}

/// Build a fixture from a live run: pin every readable file the
/// diagnostics reference and record the bundle built from those pins.
pub fn capture(request: &CaptureRequest<'_>) -> Fixture {
    let disk = DiskSource::new(request.project_root);
    let root = disk.project_root().to_path_buf();

    let mut source_files = BTreeMap::new();
    let mut seen = HashSet::new();
    for diagnostic in parse(request.raw_stderr) {
        let resolved = resolve_path(&root, &diagnostic.file_path);
        let key = source_key(&root, &resolved);
        if !seen.insert(key.clone()) {
            continue;
        }
        match disk.read(&resolved) {
            Ok(contents) => {
                source_files.insert(key, contents);
            }
            Err(err) => log::warn!("Not pinning {}: {}", resolved.display(), err),
        }
    }

    let pinned = MemorySource::new(&root, source_files.clone());
    let report = ContextBuilder::new(request.settings).build(request.raw_stderr, &pinned);

    Fixture {
        id: fixture_id(
            request.os_name,
            request.compiler_name,
            request.compiler_version,
            request.test_name,
        ),
        test_name: request.test_name.to_string(),
        os_name: request.os_name.to_string(),
        compiler_name: request.compiler_name.to_string(),
        compiler_version: request.compiler_version.to_string(),
        project_root: root.to_string_lossy().into_owned(),
        settings: request.settings,
        source_files,
        raw_stderr: request.raw_stderr.to_string(),
        expected_bundle: report.bundle,
    }
}

/// `sha256:<hex>` over every stored field, each length-prefixed
fn compute_checksum(
    metadata: &FixtureMetadata,
    raw_stderr: &str,
    expected_json: &str,
    source_files: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    let mut feed = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    };

    feed(metadata.id.as_bytes());
    feed(metadata.test_name.as_bytes());
    feed(metadata.os_name.as_bytes());
    feed(metadata.compiler_name.as_bytes());
    feed(metadata.compiler_version.as_bytes());
    feed(metadata.project_root.as_bytes());
    feed(&(metadata.settings.context_lines as u64).to_le_bytes());
    feed(&(metadata.settings.byte_budget as u64).to_le_bytes());
    feed(raw_stderr.as_bytes());
    feed(expected_json.as_bytes());
    for (key, contents) in source_files {
        feed(key.as_bytes());
        feed(contents.as_bytes());
    }

    format!("sha256:{:x}", hasher.finalize())
}

fn sorted_subdirs(dir: &Path) -> FixtureResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| FixtureError::io(dir, err))? {
        let entry = entry.map_err(|err| FixtureError::io(dir, err))?;
        let path = entry.path();
        // Skip hidden directories (starting with .)
        if path.is_dir() && !entry.file_name().to_string_lossy().starts_with('.') {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_file(path: &Path, contents: &str) -> FixtureResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| FixtureError::io(parent, err))?;
    }
    fs::write(path, contents).map_err(|err| FixtureError::io(path, err))
}

fn read_file(path: &Path) -> FixtureResult<String> {
    fs::read_to_string(path).map_err(|err| FixtureError::io(path, err))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> FixtureResult<T> {
    let contents = read_file(path)?;
    serde_json::from_str(&contents).map_err(|err| FixtureError::json(path, err))
}
