//! Task planning.
//!
//! Turns the ordered discovery listing into one [`Task`] per file, with the
//! category and disambiguation decision fixed up front from the static
//! listing.

use crate::classify::{ExtensionTable, MediaCategory};
use crate::error_log::ErrorRecord;
use crate::plan::{plan_output, relative_path};
use crate::progress::TerminalState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One file's worth of planned work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Position in dispatch order.
    pub index: usize,
    pub source: PathBuf,
    /// Source path relative to the input base directory.
    pub relative: PathBuf,
    pub category: MediaCategory,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub overwrite: bool,
    pub disambiguate: bool,
}

impl Task {
    /// Planned output path.
    pub fn output_path(&self) -> PathBuf {
        plan_output(
            &self.input_root,
            &self.output_root,
            &self.source,
            self.category,
            self.disambiguate,
        )
    }

    /// Display label, the relative source path.
    pub fn label(&self) -> String {
        self.relative.display().to_string()
    }

    /// Decide whether the task can be resolved without running it.
    ///
    /// Checked before a worker slot or progress bar is taken.
    pub fn precheck(&self, copy_files: bool) -> Option<SkipReason> {
        if !self.category.is_media() {
            return (!copy_files).then_some(SkipReason::NotMedia);
        }
        let output = self.output_path();
        if output == self.source {
            return Some(SkipReason::SameAsSource);
        }
        if !self.overwrite && output.exists() {
            return Some(SkipReason::OutputExists(output));
        }
        None
    }
}

/// Why a task was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Planned output already exists and overwrite is off.
    OutputExists(PathBuf),
    /// Copy destination already matches the source.
    Unchanged(PathBuf),
    /// Non-media file and the copy pass is off.
    NotMedia,
    /// Planned output is the source file itself.
    SameAsSource,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::OutputExists(p) => write!(f, "output exists: {}", p.display()),
            SkipReason::Unchanged(p) => write!(f, "unchanged: {}", p.display()),
            SkipReason::NotMedia => write!(f, "not a media file"),
            SkipReason::SameAsSource => write!(f, "output would overwrite the source"),
        }
    }
}

/// Terminal result of one task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Succeeded { source: PathBuf, output: PathBuf },
    Skipped { source: PathBuf, reason: SkipReason },
    Failed(ErrorRecord),
}

impl TaskResult {
    pub fn state(&self) -> TerminalState {
        match self {
            TaskResult::Succeeded { .. } => TerminalState::Succeeded,
            TaskResult::Skipped { .. } => TerminalState::Skipped,
            TaskResult::Failed(_) => TerminalState::Failed,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            TaskResult::Succeeded { source, .. } | TaskResult::Skipped { source, .. } => source,
            TaskResult::Failed(record) => &record.path,
        }
    }
}

/// Build tasks for `files`, keeping their order.
///
/// Disambiguation is decided per directory from the full listing, so it does
/// not depend on which file happens to run first.
pub fn build_tasks(
    files: &[PathBuf],
    input_root: &Path,
    output_root: &Path,
    table: &ExtensionTable,
    overwrite: bool,
) -> Vec<Task> {
    build_tasks_with_listing(files, files, input_root, output_root, table, overwrite)
}

/// Build tasks for `files`, checking name collisions against `listing`.
///
/// `listing` may hold files that get no task of their own, such as the
/// neighbours of a single input file.
pub fn build_tasks_with_listing(
    files: &[PathBuf],
    listing: &[PathBuf],
    input_root: &Path,
    output_root: &Path,
    table: &ExtensionTable,
    overwrite: bool,
) -> Vec<Task> {
    let mut by_dir: HashMap<Option<&Path>, Vec<&Path>> = HashMap::new();
    for file in listing {
        if table.is_media(file) {
            by_dir.entry(file.parent()).or_default().push(file.as_path());
        }
    }

    files
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let category = table.classify(source);
            let disambiguate = category.is_media()
                && by_dir
                    .get(&source.parent())
                    .map(|siblings| table.has_extension_collision(source, siblings))
                    .unwrap_or(false);
            Task {
                index,
                source: source.clone(),
                relative: relative_path(input_root, source),
                category,
                input_root: input_root.to_path_buf(),
                output_root: output_root.to_path_buf(),
                overwrite,
                disambiguate,
            }
        })
        .collect()
}
