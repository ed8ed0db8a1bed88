//! Bounded parallel dispatch of tasks.
//!
//! Tasks are dispatched in discovery order onto blocking threads, at most
//! `max_workers` at a time, gated by a tokio [`Semaphore`]. A panicking task
//! is contained by its blocking thread and reported as a failure of that task
//! alone.

use crate::error_log::ErrorKind;
use crate::task::{Task, TaskResult};
use crate::worker::Worker;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

/// Dispatches tasks to a bounded pool of workers.
pub struct Scheduler {
    /// Semaphore for limiting concurrent tasks
    semaphore: Arc<Semaphore>,
    worker: Arc<Worker>,
    copy_files: bool,
}

impl Scheduler {
    pub fn new(worker: Worker, max_workers: usize, copy_files: bool) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            worker: Arc::new(worker),
            copy_files,
        }
    }

    /// Run every task to a terminal result.
    ///
    /// Tasks that can be resolved up front (existing output, non-media with
    /// copying off) are skipped without taking a slot. Results are returned
    /// in completion-collection order, not dispatch order.
    pub async fn run(&self, tasks: Vec<Task>) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(tasks.len());
        let mut running: Vec<(PathBuf, JoinHandle<TaskResult>)> = Vec::new();

        for task in tasks {
            if let Some(reason) = task.precheck(self.copy_files) {
                info!(file = %task.label(), reason = %reason, "skipped");
                results.push(TaskResult::Skipped {
                    source: task.source,
                    reason,
                });
                continue;
            }

            // The semaphore lives as long as the scheduler and is never closed.
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            debug!(file = %task.label(), index = task.index, "dispatching");

            let worker = self.worker.clone();
            let source = task.source.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                worker.execute(&task)
            });
            running.push((source, handle));
        }

        for (source, handle) in running {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => self.worker.fail(
                    &source,
                    ErrorKind::WorkerPanic,
                    join_error_message(join_err),
                ),
            };
            results.push(result);
        }

        results
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("worker task cancelled: {}", err);
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", msg)
    } else {
        "worker panicked".to_string()
    }
}
