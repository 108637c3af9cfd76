//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs executing their pipeline at once
    pub max_concurrent_jobs: usize,
    /// Whole-job deadline
    pub job_timeout: Duration,
    /// Root of the per-job working directories
    pub work_dir: PathBuf,
    /// Remove a failed job's working directory
    pub purge_failed: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(1800),
            work_dir: PathBuf::from("/tmp/beatreel"),
            purge_failed: false,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(2),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/beatreel")),
            purge_failed: std::env::var("WORKER_PURGE_FAILED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}
