//! Discovery of input files.
//!
//! Walks the input tree and returns every regular file in a deterministic
//! order: shallower files first, then older files first, with remaining ties
//! left in walk order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Fatal errors raised before any task runs.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The input path does not exist.
    #[error("Input path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The input path exists but cannot be read.
    #[error("Input path unreadable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A regular file found under the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Number of path segments below the input root (1 = directly inside).
    pub depth: usize,
    /// Last modified time, `UNIX_EPOCH` when unavailable.
    pub modified: SystemTime,
}

/// Resolved input location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRoot {
    /// Canonical path the user pointed at (directory or single file).
    pub path: PathBuf,
    /// Directory relative paths are computed against.
    pub base_dir: PathBuf,
}

impl InputRoot {
    /// Canonicalise `input` and work out the base directory.
    pub fn resolve(input: &Path) -> Result<Self, DiscoveryError> {
        let path = fs::canonicalize(input).map_err(|source| map_io(input, source))?;
        let metadata = fs::metadata(&path).map_err(|source| map_io(&path, source))?;

        let base_dir = if metadata.is_file() {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"))
        } else {
            path.clone()
        };

        Ok(Self { path, base_dir })
    }

    pub fn is_single_file(&self) -> bool {
        self.path != self.base_dir
    }
}

fn map_io(path: &Path, source: io::Error) -> DiscoveryError {
    if source.kind() == io::ErrorKind::NotFound {
        DiscoveryError::NotFound(path.to_path_buf())
    } else {
        DiscoveryError::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Discover every regular file under `input_root`, in processing order.
///
/// A single file input yields just that file. Directories are never returned;
/// symlinks are followed, so a link to a media file is discovered under the
/// link's own path. Unreadable entries below the root (including symlink
/// loops) are logged and skipped; an unreadable root is fatal.
pub fn discover_files(input_root: &Path) -> Result<Vec<DiscoveredFile>, DiscoveryError> {
    let root_meta = fs::metadata(input_root).map_err(|source| map_io(input_root, source))?;

    let mut files = Vec::new();
    for entry in WalkDir::new(input_root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                return Err(map_io(input_root, source));
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        // A single-file root sits at walk depth 0 but is one segment below its parent.
        let depth = if root_meta.is_file() {
            1
        } else {
            entry.depth()
        };

        files.push(DiscoveredFile {
            path: entry.into_path(),
            depth,
            modified,
        });
    }

    sort_for_processing(&mut files);
    debug!(count = files.len(), root = %input_root.display(), "discovery complete");
    Ok(files)
}

/// Discover file paths under `input_root`, in processing order.
pub fn discover(input_root: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    Ok(discover_files(input_root)?
        .into_iter()
        .map(|f| f.path)
        .collect())
}

/// Regular files directly inside `dir`, in walk order.
///
/// Used as the collision listing for a single-file input, so its same-stem
/// neighbours are seen exactly as a run over the whole directory would see
/// them. Unreadable entries are skipped.
pub fn list_directory(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Order by depth, then modification time.
///
/// The sort is stable, so files with equal keys keep their walk order.
pub fn sort_for_processing(files: &mut [DiscoveredFile]) {
    files.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.modified.cmp(&b.modified)));
}
