//! Worker planning.
//!
//! Derives the number of concurrent encode slots from configuration and the
//! machine's logical core count.

use crate::config::RunConfig;

/// Upper bound for an automatically derived worker count.
const MAX_AUTO_WORKERS: u32 = 8;

/// Worker plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of concurrent encodes
    pub max_workers: u32,
}

impl WorkerPlan {
    /// Derive a worker plan using the detected core count.
    pub fn derive(cfg: &RunConfig) -> Self {
        Self::derive_with_cores(cfg, num_cpus::get() as u32)
    }

    /// Derive a worker plan for a known core count.
    ///
    /// - An explicit non-zero `max_workers` is used unchanged
    /// - Zero derives `cores / 2`, clamped to `[1, 8]`
    pub fn derive_with_cores(cfg: &RunConfig, total_cores: u32) -> Self {
        let max_workers = if cfg.max_workers > 0 {
            cfg.max_workers
        } else {
            derive_workers(total_cores)
        };

        Self {
            total_cores,
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers as usize
    }
}

/// Half the cores, at least one, at most [`MAX_AUTO_WORKERS`].
fn derive_workers(cores: u32) -> u32 {
    (cores / 2).clamp(1, MAX_AUTO_WORKERS)
}
