//! mediabatch
//!
//! Batch media encoding: discovers files under an input tree, classifies them
//! as video, audio or other, and encodes media into a mirrored output tree
//! with a bounded pool of parallel workers.

pub mod batch;
pub mod classify;
pub mod concurrency;
pub mod copy;
pub mod encode;
pub mod error_log;
pub mod plan;
pub mod progress;
pub mod scan;
pub mod scheduler;
pub mod startup;
pub mod task;
pub mod worker;

pub use mediabatch_config as config;
pub use mediabatch_config::Config;
pub use batch::{Batch, BatchError, RunPlan, RunSummary};
pub use classify::{ExtensionTable, MediaCategory};
pub use concurrency::WorkerPlan;
pub use copy::{copy_if_different, CopyError, CopyOutcome};
pub use encode::{EncodeError, EncodeRequest, EncodeSettings, Encoder, FfmpegEncoder, HwAccel};
pub use error_log::{ErrorKind, ErrorRecord, ErrorSink};
pub use plan::{default_output_root, ensure_output_dir, plan_output, DirectoryCreationError};
pub use progress::{ProgressHub, ProgressReporter, ProgressTracker, TerminalState};
pub use scan::{discover, discover_files, list_directory, DiscoveredFile, DiscoveryError, InputRoot};
pub use scheduler::Scheduler;
pub use startup::{run_startup_checks, StartupError};
pub use task::{build_tasks, build_tasks_with_listing, SkipReason, Task, TaskResult};
pub use worker::{run_encode, EncodeMode, FallbackError, Worker};
