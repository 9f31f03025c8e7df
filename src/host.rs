//! Boundary to the host runtime.
//!
//! The engine never reflects over or hot-swaps host code itself. It asks a
//! [`MethodSource`] for a disassembled body and hands the rendered result to a
//! [`BodyInstaller`]. Listings on disk (`*.json` serializations of
//! [`MethodBody`]) and an in-memory host are provided for tooling and tests.

use crate::cursor::RenderedBody;
use crate::il::{MethodBody, MethodTarget};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Minimum Jaro-Winkler similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.85;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("method {target} not found{}", suggestion_suffix(.suggestion))]
    MethodNotFound {
        target: MethodTarget,
        suggestion: Option<MethodTarget>,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid listing {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("installer rejected {target}: {reason}")]
    Rejected { target: MethodTarget, reason: String },
}

fn suggestion_suffix(suggestion: &Option<MethodTarget>) -> String {
    match suggestion {
        Some(candidate) => format!(" (did you mean {candidate}?)"),
        None => String::new(),
    }
}

/// Supplies disassembled method bodies by name.
pub trait MethodSource {
    fn load(&self, target: &MethodTarget) -> Result<MethodBody, HostError>;
}

/// Installs a rendered body in place of the original method.
pub trait BodyInstaller {
    fn install(&mut self, target: &MethodTarget, rendered: &RenderedBody) -> Result<(), HostError>;
}

/// Closest known target to `wanted`, if any is close enough.
pub fn suggest<'a>(
    wanted: &MethodTarget,
    candidates: impl IntoIterator<Item = &'a MethodTarget>,
) -> Option<MethodTarget> {
    let wanted = wanted.to_string();
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(&wanted, &candidate.to_string()), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.clone())
}

/// Host backed by plain maps: loads from `methods`, records installs.
#[derive(Debug, Default, Clone)]
pub struct MemoryHost {
    methods: BTreeMap<MethodTarget, MethodBody>,
    installed: BTreeMap<MethodTarget, MethodBody>,
    rejected: BTreeSet<MethodTarget>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, body: MethodBody) -> Self {
        self.add(body);
        self
    }

    pub fn add(&mut self, body: MethodBody) {
        self.methods.insert(body.target.clone(), body);
    }

    /// Make installs of `target` fail.
    pub fn reject(&mut self, target: MethodTarget) {
        self.rejected.insert(target);
    }

    pub fn installed(&self, target: &MethodTarget) -> Option<&MethodBody> {
        self.installed.get(target)
    }

    pub fn installed_targets(&self) -> impl Iterator<Item = &MethodTarget> {
        self.installed.keys()
    }
}

impl MethodSource for MemoryHost {
    fn load(&self, target: &MethodTarget) -> Result<MethodBody, HostError> {
        self.methods
            .get(target)
            .cloned()
            .ok_or_else(|| HostError::MethodNotFound {
                target: target.clone(),
                suggestion: suggest(target, self.methods.keys()),
            })
    }
}

impl BodyInstaller for MemoryHost {
    fn install(&mut self, target: &MethodTarget, rendered: &RenderedBody) -> Result<(), HostError> {
        if self.rejected.contains(target) {
            return Err(HostError::Rejected {
                target: target.clone(),
                reason: "target is locked".to_string(),
            });
        }
        self.installed.insert(target.clone(), rendered.body.clone());
        Ok(())
    }
}

/// A directory tree of JSON listings, indexed by the target each declares.
#[derive(Debug)]
pub struct ListingDirectory {
    root: PathBuf,
    index: BTreeMap<MethodTarget, PathBuf>,
}

impl ListingDirectory {
    /// Index every `*.json` listing under `root`. Files that do not parse as
    /// a listing are skipped with a warning. When two files declare the same
    /// target, the later one in file-name order wins, also with a warning.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, HostError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(HostError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "listing directory does not exist",
                ),
                path: root,
            });
        }

        let mut index = BTreeMap::new();
        for entry in WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        {
            match read_listing(entry.path()) {
                Ok(body) => {
                    debug!(
                        target = %body.target,
                        path = %entry.path().display(),
                        "indexed listing"
                    );
                    let path = entry.into_path();
                    if let Some(previous) = index.insert(body.target.clone(), path.clone()) {
                        warn!(
                            target = %body.target,
                            "{} and {} declare the same method; using the latter",
                            previous.display(),
                            path.display()
                        );
                    }
                }
                Err(err) => warn!("skipping {}: {err}", entry.path().display()),
            }
        }
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn targets(&self) -> impl Iterator<Item = &MethodTarget> {
        self.index.keys()
    }

    pub fn path_of(&self, target: &MethodTarget) -> Option<&Path> {
        self.index.get(target).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl MethodSource for ListingDirectory {
    fn load(&self, target: &MethodTarget) -> Result<MethodBody, HostError> {
        match self.index.get(target) {
            Some(path) => read_listing(path),
            None => Err(HostError::MethodNotFound {
                target: target.clone(),
                suggestion: suggest(target, self.index.keys()),
            }),
        }
    }
}

/// Installs rendered bodies as listings in an output directory.
#[derive(Debug)]
pub struct ListingWriter {
    out_dir: PathBuf,
    written: Vec<PathBuf>,
}

impl ListingWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl BodyInstaller for ListingWriter {
    fn install(&mut self, target: &MethodTarget, rendered: &RenderedBody) -> Result<(), HostError> {
        std::fs::create_dir_all(&self.out_dir).map_err(|source| HostError::Io {
            path: self.out_dir.clone(),
            source,
        })?;
        let path = self.out_dir.join(listing_file_name(target));
        write_listing_atomic(&path, &rendered.body)?;
        debug!(%target, path = %path.display(), "wrote listing");
        self.written.push(path);
        Ok(())
    }
}

/// `Namespace.Type.method.json`, with anything unusual in a file name
/// replaced by `_`.
pub fn listing_file_name(target: &MethodTarget) -> String {
    let stem: String = format!("{}.{}", target.declaring_type, target.method)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}.json")
}

pub fn read_listing(path: &Path) -> Result<MethodBody, HostError> {
    let text = std::fs::read_to_string(path).map_err(|source| HostError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| HostError::Listing {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `body` as pretty JSON: tempfile in the same directory, fsync, rename.
pub fn write_listing_atomic(path: &Path, body: &MethodBody) -> Result<(), HostError> {
    let io_err = |source| HostError::Io {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(body).map_err(|source| HostError::Listing {
        path: path.to_path_buf(),
        source,
    })?;

    let parent = path.parent().ok_or_else(|| {
        io_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path has no parent directory",
        ))
    })?;
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(json.as_bytes()).map_err(io_err)?;
    temp.write_all(b"\n").map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

impl fmt::Display for ListingDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} listing(s))", self.root.display(), self.index.len())
    }
}
