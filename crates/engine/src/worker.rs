//! Execution of a single task.
//!
//! Runs on a blocking thread owned by the scheduler. Every failure is caught
//! here, written to the error sink, and turned into [`TaskResult::Failed`].

use crate::classify::MediaCategory;
use crate::copy::{copy_if_different, CopyOutcome};
use crate::encode::{EncodeError, EncodeRequest, EncodeSettings, Encoder};
use crate::error_log::{ErrorKind, ErrorRecord, ErrorSink};
use crate::plan::ensure_output_dir;
use crate::progress::{ProgressHub, ProgressReporter, TerminalState};
use crate::task::{SkipReason, Task, TaskResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// How a successful encode ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// With live progress.
    Tracked,
    /// Progress failed; the direct fallback run succeeded.
    Direct,
}

/// Both the progress-tracked run and the direct fallback failed.
#[derive(Debug, Error)]
#[error("{direct} (progress run: {tracked})")]
pub struct FallbackError {
    pub tracked: EncodeError,
    pub direct: EncodeError,
}

/// Attempt a progress-tracked encode, then one direct run if that fails.
pub fn run_encode(
    encoder: &dyn Encoder,
    request: &EncodeRequest,
    reporter: &mut ProgressReporter,
) -> Result<EncodeMode, FallbackError> {
    let tracked = match encoder.encode_with_progress(request, &mut |p| reporter.update(p)) {
        Ok(()) => return Ok(EncodeMode::Tracked),
        Err(e) => e,
    };

    warn!(
        file = %request.source.display(),
        error = %tracked,
        "progress unavailable, running encoder directly"
    );
    reporter.fall_back();

    encoder
        .encode_direct(request)
        .map(|()| EncodeMode::Direct)
        .map_err(|direct| FallbackError { tracked, direct })
}

/// Shared state for running tasks.
#[derive(Clone)]
pub struct Worker {
    encoder: Arc<dyn Encoder>,
    settings: EncodeSettings,
    sink: Arc<ErrorSink>,
    progress: ProgressHub,
}

impl Worker {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        settings: EncodeSettings,
        sink: Arc<ErrorSink>,
        progress: ProgressHub,
    ) -> Self {
        Self {
            encoder,
            settings,
            sink,
            progress,
        }
    }

    /// Run one task to a terminal result. Never returns an error.
    pub fn execute(&self, task: &Task) -> TaskResult {
        let output = task.output_path();
        if let Err(e) = ensure_output_dir(&output) {
            return self.fail(&task.source, ErrorKind::DirectoryCreationError, e.to_string());
        }

        match task.category {
            MediaCategory::Other => self.copy(task, output),
            MediaCategory::Video | MediaCategory::Audio => self.encode(task, output),
        }
    }

    fn encode(&self, task: &Task, output: PathBuf) -> TaskResult {
        let request = EncodeRequest {
            source: task.source.clone(),
            destination: output,
            settings: self.settings.for_category(task.category),
        };

        let mut reporter = self.progress.start(task.label());
        match run_encode(self.encoder.as_ref(), &request, &mut reporter) {
            Ok(mode) => {
                reporter.finish(TerminalState::Succeeded);
                if mode == EncodeMode::Direct {
                    info!(file = %task.label(), "encoded without live progress");
                }
                TaskResult::Succeeded {
                    source: request.source,
                    output: request.destination,
                }
            }
            Err(e) => {
                reporter.finish(TerminalState::Failed);
                remove_partial_output(&request.destination);
                self.fail(&task.source, ErrorKind::EncodeError, e.to_string())
            }
        }
    }

    fn copy(&self, task: &Task, output: PathBuf) -> TaskResult {
        match copy_if_different(&task.source, &output) {
            Ok(CopyOutcome::Copied) => {
                info!(file = %task.label(), "copied");
                TaskResult::Succeeded {
                    source: task.source.clone(),
                    output,
                }
            }
            Ok(CopyOutcome::Unchanged) => TaskResult::Skipped {
                source: task.source.clone(),
                reason: SkipReason::Unchanged(output),
            },
            Err(e) => self.fail(&task.source, ErrorKind::CopyError, e.to_string()),
        }
    }

    /// Record a failure and build the matching result.
    pub fn fail(&self, source: &Path, kind: ErrorKind, message: impl Into<String>) -> TaskResult {
        let record = ErrorRecord::now(source, kind, message);
        error!(
            file = %record.path.display(),
            kind = %record.kind,
            "{}",
            record.message
        );
        self.sink.record(&record);
        TaskResult::Failed(record)
    }
}

/// A failed encode can leave a truncated file behind; a later run would
/// otherwise skip it as already done.
fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(file = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "failed to remove partial output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ExtensionTable;
    use crate::encode::fake::{FakeEncoder, FakeOutcome, Script};
    use crate::task::build_tasks;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        input: PathBuf,
        output: PathBuf,
        log: PathBuf,
    }

    fn fixture(files: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in");
        let output = temp.path().join("out");
        for file in files {
            let path = input.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"source").unwrap();
        }
        let log = temp.path().join("errors.txt");
        Fixture {
            _temp: temp,
            input,
            output,
            log,
        }
    }

    fn worker(encoder: Arc<FakeEncoder>, log: &Path) -> Worker {
        Worker::new(
            encoder,
            EncodeSettings::default(),
            Arc::new(ErrorSink::new(log)),
            ProgressHub::hidden(),
        )
    }

    fn tasks_for(fx: &Fixture, files: &[&str]) -> Vec<Task> {
        let paths: Vec<PathBuf> = files.iter().map(|f| fx.input.join(f)).collect();
        build_tasks(&paths, &fx.input, &fx.output, &ExtensionTable::default(), false)
    }

    #[test]
    fn test_encode_success_creates_output_dirs() {
        let fx = fixture(&["season1/ep1.mkv"]);
        let encoder = Arc::new(FakeEncoder::new());
        let w = worker(encoder.clone(), &fx.log);

        let task = &tasks_for(&fx, &["season1/ep1.mkv"])[0];
        let result = w.execute(task);

        let expected = fx.output.join("season1/ep1.mp4");
        assert_eq!(
            result,
            TaskResult::Succeeded {
                source: fx.input.join("season1/ep1.mkv"),
                output: expected.clone(),
            }
        );
        assert!(expected.is_file());
        assert_eq!(encoder.tracked_calls(), 1);
        assert_eq!(encoder.direct_calls(), 0);
        assert!(!fx.log.exists());
    }

    #[test]
    fn test_progress_unavailable_falls_back_to_direct() {
        let fx = fixture(&["song.flac"]);
        let encoder = Arc::new(FakeEncoder::new().with_script("song.flac", Script::no_progress()));
        let w = worker(encoder.clone(), &fx.log);

        let result = w.execute(&tasks_for(&fx, &["song.flac"])[0]);

        assert_eq!(result.state(), TerminalState::Succeeded);
        assert_eq!(encoder.tracked_calls(), 1);
        assert_eq!(encoder.direct_calls(), 1);
        assert!(fx.output.join("song.m4a").is_file());
        assert!(!fx.log.exists());
    }

    #[test]
    fn test_failure_after_fallback_is_logged_once() {
        let fx = fixture(&["bad.mkv"]);
        let encoder = Arc::new(FakeEncoder::new().with_script("bad.mkv", Script::fail()));
        let w = worker(encoder.clone(), &fx.log);

        let result = w.execute(&tasks_for(&fx, &["bad.mkv"])[0]);

        match &result {
            TaskResult::Failed(record) => {
                assert_eq!(record.kind, ErrorKind::EncodeError);
                assert_eq!(record.path, fx.input.join("bad.mkv"));
                assert!(record.message.contains("progress run"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(encoder.direct_calls(), 1);
        let log = fs::read_to_string(&fx.log).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains(": EncodeError: "));
    }

    #[test]
    fn test_tracked_failure_with_direct_success() {
        let fx = fixture(&["flaky.mkv"]);
        let script = Script {
            signals: vec![30.0, 60.0],
            tracked: FakeOutcome::Fail,
            direct: FakeOutcome::Succeed,
        };
        let encoder = Arc::new(FakeEncoder::new().with_script("flaky.mkv", script));
        let w = worker(encoder.clone(), &fx.log);

        let result = w.execute(&tasks_for(&fx, &["flaky.mkv"])[0]);
        assert_eq!(result.state(), TerminalState::Succeeded);
        assert!(!fx.log.exists());
    }

    #[test]
    fn test_directory_creation_failure() {
        let fx = fixture(&["a/clip.mkv"]);
        fs::create_dir_all(&fx.output).unwrap();
        fs::write(fx.output.join("a"), b"blocker").unwrap();
        let encoder = Arc::new(FakeEncoder::new());
        let w = worker(encoder.clone(), &fx.log);

        let result = w.execute(&tasks_for(&fx, &["a/clip.mkv"])[0]);
        match result {
            TaskResult::Failed(record) => {
                assert_eq!(record.kind, ErrorKind::DirectoryCreationError)
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(encoder.invocations(), 0);
    }

    #[test]
    fn test_copy_then_unchanged() {
        let fx = fixture(&["notes/readme.txt"]);
        let encoder = Arc::new(FakeEncoder::new());
        let w = worker(encoder.clone(), &fx.log);
        let task = &tasks_for(&fx, &["notes/readme.txt"])[0];

        assert_eq!(w.execute(task).state(), TerminalState::Succeeded);
        assert_eq!(
            w.execute(task),
            TaskResult::Skipped {
                source: fx.input.join("notes/readme.txt"),
                reason: SkipReason::Unchanged(fx.output.join("notes/readme.txt")),
            }
        );
        assert_eq!(encoder.invocations(), 0);
    }

    #[test]
    fn test_partial_output_is_removed() {
        let fx = fixture(&["bad.mkv"]);
        fs::create_dir_all(&fx.output).unwrap();
        fs::write(fx.output.join("bad.mp4"), b"truncated").unwrap();
        let encoder = Arc::new(FakeEncoder::new().with_script("bad.mkv", Script::fail()));
        let w = worker(encoder, &fx.log);

        let result = w.execute(&tasks_for(&fx, &["bad.mkv"])[0]);
        assert_eq!(result.state(), TerminalState::Failed);
        assert!(!fx.output.join("bad.mp4").exists());
    }
}
