//! Batch entry point.
//!
//! Wires configuration, startup checks, discovery, task planning and the
//! scheduler into one run over an input tree.

use crate::classify::ExtensionTable;
use crate::concurrency::WorkerPlan;
use crate::config::{Config, ConfigError};
use crate::encode::{EncodeSettings, Encoder, FfmpegEncoder};
use crate::error_log::{ErrorKind, ErrorRecord, ErrorSink};
use crate::plan::default_output_root;
use crate::progress::{ProgressHub, TerminalState};
use crate::scan::{discover, list_directory, DiscoveryError, InputRoot};
use crate::scheduler::Scheduler;
use crate::startup::{run_startup_checks, StartupError};
use crate::task::{build_tasks_with_listing, Task, TaskResult};
use crate::worker::Worker;
use indicatif::HumanDuration;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Error type for batch operations
#[derive(Debug, Error)]
pub enum BatchError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Input could not be discovered
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Everything decided before the first task runs.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub input: InputRoot,
    pub output_root: PathBuf,
    pub tasks: Vec<Task>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_root: PathBuf,
    pub error_log: PathBuf,
    pub results: Vec<TaskResult>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn count(&self, state: TerminalState) -> usize {
        self.results.iter().filter(|r| r.state() == state).count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(TerminalState::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(TerminalState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(TerminalState::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// A configured batch ready to run.
pub struct Batch {
    /// Configuration after file, environment and caller overrides
    pub config: Config,
    /// Derived worker plan
    pub worker_plan: WorkerPlan,
    table: ExtensionTable,
    encoder: Arc<dyn Encoder>,
    sink: Arc<ErrorSink>,
    progress: ProgressHub,
}

impl Batch {
    /// Run startup checks and build a validated ffmpeg batch.
    pub fn new(config: Config, progress: ProgressHub) -> Result<Self, BatchError> {
        run_startup_checks(&config.encode)?;
        let encoder = Arc::new(FfmpegEncoder::from_config(&config.encode));
        Self::with_encoder(config, encoder, progress)
    }

    /// Like [`Batch::new`] without probing for ffmpeg.
    pub fn new_without_checks(config: Config, progress: ProgressHub) -> Result<Self, BatchError> {
        let encoder = Arc::new(FfmpegEncoder::from_config(&config.encode));
        Self::with_encoder(config, encoder, progress)
    }

    /// Build a batch around any encoder.
    pub fn with_encoder(
        config: Config,
        encoder: Arc<dyn Encoder>,
        progress: ProgressHub,
    ) -> Result<Self, BatchError> {
        config.validate()?;
        let worker_plan = WorkerPlan::derive(&config.run);
        let table = ExtensionTable::from_config(&config.extensions);
        let sink = Arc::new(ErrorSink::new(&config.run.error_log));

        Ok(Self {
            config,
            worker_plan,
            table,
            encoder,
            sink,
            progress,
        })
    }

    /// Discover `input` and plan every task.
    ///
    /// A discovery failure is written to the error log before it is returned.
    pub fn plan(&self, input: &Path, output: Option<&Path>) -> Result<RunPlan, BatchError> {
        let (input, files) = match InputRoot::resolve(input)
            .and_then(|root| discover(&root.path).map(|files| (root, files)))
        {
            Ok(found) => found,
            Err(e) => {
                self.sink.record(&ErrorRecord::now(
                    absolute(input),
                    ErrorKind::DiscoveryError,
                    e.to_string(),
                ));
                return Err(e.into());
            }
        };

        let output_root = match output {
            Some(path) => absolute(path),
            None => default_output_root(&input.path),
        };

        let files = exclude_output_tree(files, &input.base_dir, &output_root);
        // A lone file still has to see its same-stem neighbours.
        let listing = if input.is_single_file() {
            list_directory(&input.base_dir)
        } else {
            files.clone()
        };
        let tasks = build_tasks_with_listing(
            &files,
            &listing,
            &input.base_dir,
            &output_root,
            &self.table,
            self.config.run.overwrite,
        );

        Ok(RunPlan {
            input,
            output_root,
            tasks,
        })
    }

    /// Run the whole batch.
    ///
    /// Only discovery aborts the run; individual task failures are counted
    /// in the summary.
    pub async fn run(&self, input: &Path, output: Option<&Path>) -> Result<RunSummary, BatchError> {
        let started = Instant::now();
        let plan = self.plan(input, output)?;

        info!(
            input = %plan.input.path.display(),
            output = %plan.output_root.display(),
            files = plan.tasks.len(),
            workers = self.worker_plan.max_workers,
            "starting batch"
        );

        let worker = Worker::new(
            self.encoder.clone(),
            EncodeSettings::from_config(&self.config.encode),
            self.sink.clone(),
            self.progress.clone(),
        );
        let scheduler = Scheduler::new(
            worker,
            self.worker_plan.max_workers(),
            self.config.run.copy_files,
        );
        let results = scheduler.run(plan.tasks).await;

        let summary = RunSummary {
            output_root: plan.output_root,
            error_log: self.sink.path().to_path_buf(),
            results,
            elapsed: started.elapsed(),
        };
        info!(
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            elapsed = %HumanDuration(summary.elapsed),
            "batch complete"
        );
        if summary.has_failures() {
            warn!(log = %summary.error_log.display(), "some files failed");
        }
        Ok(summary)
    }
}

/// Absolute form of `path`, resolving symlinks when it exists.
fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Drop files that live under an output root nested inside the input.
///
/// Without this a second run would pick up the first run's outputs as
/// inputs.
fn exclude_output_tree(files: Vec<PathBuf>, base_dir: &Path, output_root: &Path) -> Vec<PathBuf> {
    if output_root == base_dir || !output_root.starts_with(base_dir) {
        return files;
    }
    files
        .into_iter()
        .filter(|f| !f.starts_with(output_root))
        .collect()
}
