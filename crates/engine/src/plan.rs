//! Path planner for output locations.
//!
//! Output paths mirror the input tree under the output root, with the
//! extension normalised per category and an optional `_<ext>` suffix when two
//! media files share a stem.

use crate::classify::MediaCategory;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix of the derived output directory name.
pub const OUTPUT_DIR_PREFIX: &str = "encoded_";

/// An output directory could not be created.
#[derive(Debug, Error)]
#[error("Failed to create output directory {}: {source}", path.display())]
pub struct DirectoryCreationError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Strip `input_root` from `source_path`.
///
/// Falls back to the file name when `source_path` is not below `input_root`.
pub fn relative_path(input_root: &Path, source_path: &Path) -> PathBuf {
    match source_path.strip_prefix(input_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => source_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default(),
    }
}

/// Suffix inserted before the target extension, e.g. `_wav`.
pub fn disambiguation_suffix(source_path: &Path) -> String {
    source_path
        .extension()
        .map(|ext| format!("_{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Compute the output path for a source file.
///
/// Pure: identical inputs always produce the identical path, and nothing is
/// touched on disk. Media files get the category's container extension; other
/// files keep their relative path verbatim.
pub fn plan_output(
    input_root: &Path,
    output_root: &Path,
    source_path: &Path,
    category: MediaCategory,
    disambiguate: bool,
) -> PathBuf {
    let rel = relative_path(input_root, source_path);
    let Some(target_ext) = category.target_extension() else {
        return output_root.join(rel);
    };

    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    let mut file_name: OsString = rel.file_stem().map(OsString::from).unwrap_or_default();
    if disambiguate {
        file_name.push(disambiguation_suffix(source_path));
    }
    file_name.push(".");
    file_name.push(target_ext);

    output_root.join(parent).join(file_name)
}

/// Create the parent directory of `output_path`, recursively.
///
/// Safe under concurrent calls for the same directory: a directory that
/// already exists, or appears while we are creating it, counts as success.
pub fn ensure_output_dir(output_path: &Path) -> Result<(), DirectoryCreationError> {
    let Some(dir) = output_path.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }

    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(DirectoryCreationError {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Default output root for an input path.
///
/// A directory `/data/shows` maps to `/data/encoded_shows`; a single file maps
/// to its own parent directory.
pub fn default_output_root(input: &Path) -> PathBuf {
    if input.is_file() {
        return input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
    }

    let mut name = OsString::from(OUTPUT_DIR_PREFIX);
    match input.file_name() {
        Some(dir_name) => name.push(dir_name),
        None => name.push("output"),
    }
    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}
