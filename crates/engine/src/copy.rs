//! Copy pass for non-media files.
//!
//! Mirrors a file into the output tree unless the destination already looks
//! identical (same size and same modification time).

use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Copying a non-media file failed.
#[derive(Debug, Error)]
#[error("Failed to copy {} to {}: {source}", from.display(), to.display())]
pub struct CopyError {
    pub from: PathBuf,
    pub to: PathBuf,
    #[source]
    pub source: io::Error,
}

/// What `copy_if_different` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The destination was written.
    Copied,
    /// The destination already matched; nothing was written.
    Unchanged,
}

/// True when `destination` exists with the same size and mtime as `source`.
pub fn is_same_file_content(source: &fs::Metadata, destination: &Path) -> bool {
    let Ok(dest) = fs::metadata(destination) else {
        return false;
    };
    if !dest.is_file() || dest.len() != source.len() {
        return false;
    }
    match (source.modified(), dest.modified()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy `source` to `destination` when they differ.
///
/// After a copy the destination's modification time is set to the source's,
/// so a second call on an unchanged source is a no-op.
pub fn copy_if_different(source: &Path, destination: &Path) -> Result<CopyOutcome, CopyError> {
    let wrap = |source_err: io::Error| CopyError {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: source_err,
    };

    let src_meta = fs::metadata(source).map_err(wrap)?;
    if is_same_file_content(&src_meta, destination) {
        return Ok(CopyOutcome::Unchanged);
    }

    fs::copy(source, destination).map_err(wrap)?;

    set_file_mtime(destination, FileTime::from_last_modification_time(&src_meta)).map_err(wrap)?;

    Ok(CopyOutcome::Copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_copy_is_noop() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("notes.txt");
        let dst = temp.path().join("notes-copy.txt");
        fs::write(&src, b"hello").unwrap();

        assert_eq!(copy_if_different(&src, &dst).unwrap(), CopyOutcome::Copied);
        let first_mtime = fs::metadata(&dst).unwrap().modified().unwrap();

        assert_eq!(copy_if_different(&src, &dst).unwrap(), CopyOutcome::Unchanged);
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), first_mtime);
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
    }

    #[test]
    fn test_changed_source_is_recopied() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst = temp.path().join("b.txt");
        fs::write(&src, b"one").unwrap();
        copy_if_different(&src, &dst).unwrap();

        fs::write(&src, b"three").unwrap();
        set_file_mtime(&src, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        assert_eq!(copy_if_different(&src, &dst).unwrap(), CopyOutcome::Copied);
        assert_eq!(fs::read(&dst).unwrap(), b"three");
    }

    #[test]
    fn test_same_size_different_mtime_is_recopied() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        let dst = temp.path().join("b.txt");
        fs::write(&src, b"abc").unwrap();
        fs::write(&dst, b"xyz").unwrap();
        set_file_mtime(&src, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        set_file_mtime(&dst, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        assert_eq!(copy_if_different(&src, &dst).unwrap(), CopyOutcome::Copied);
        assert_eq!(fs::read(&dst).unwrap(), b"abc");
    }

    #[test]
    fn test_missing_source_is_copy_error() {
        let temp = TempDir::new().unwrap();
        let err = copy_if_different(&temp.path().join("gone"), &temp.path().join("dst")).unwrap_err();
        assert_eq!(err.from, temp.path().join("gone"));
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
