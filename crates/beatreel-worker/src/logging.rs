//! Structured render-job logging.
//!
//! Every line a job emits nests under one `render_job` span. The span starts
//! with only `job_id` set; `plan`, `total_frames` and `stage` are recorded as
//! the job moves forward so late lines carry the full context.

use std::time::Duration;

use beatreel_models::{Job, JobId};
use tracing::field::Empty;
use tracing::{debug, error, info, warn, Span};

use crate::error::WorkerError;

/// Frames between progress lines at `info`.
pub const PROGRESS_LOG_INTERVAL: u64 = 150;

/// Whether a captured-frame count deserves an `info` line rather than `debug`.
pub fn is_progress_milestone(captured: u64, total: u64) -> bool {
    captured == total || (captured > 0 && captured % PROGRESS_LOG_INTERVAL == 0)
}

/// Logs one render job's lifecycle under a shared span.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    span: Span,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        let span = tracing::info_span!(
            "render_job",
            job_id = %job_id,
            plan = Empty,
            total_frames = Empty,
            stage = Empty,
        );
        Self {
            job_id: job_id.clone(),
            span,
        }
    }

    /// Span to instrument the job's future with.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    /// Record what the job is about to render.
    pub fn started(&self, job: &Job) {
        self.span.record("plan", job.request.plan.as_str());
        self.span.record("total_frames", job.total_frames);
        info!(
            job_id = %self.job_id,
            resolution = %job.resolution,
            duration_sec = job.request.duration_sec,
            "Render job started"
        );
    }

    pub fn stage(&self, stage: &'static str) {
        self.span.record("stage", stage);
        debug!(job_id = %self.job_id, stage, "Entering stage");
    }

    pub fn frame_captured(&self, captured: u64, total: u64) {
        if is_progress_milestone(captured, total) {
            info!(job_id = %self.job_id, captured, total, "Frames captured");
        } else {
            debug!(job_id = %self.job_id, captured, total, "Frame captured");
        }
    }

    pub fn inputs_ready(&self, frames: u64, audio_bytes: u64) {
        info!(job_id = %self.job_id, frames, audio_bytes, "Frames and audio ready");
    }

    pub fn completed(&self, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            elapsed_secs = elapsed.as_secs_f64(),
            "Render job completed"
        );
    }

    /// `message` is the already-redacted text stored on the job.
    pub fn failed(&self, error: &WorkerError, message: &str) {
        self.span.record("stage", error.stage());
        error!(
            job_id = %self.job_id,
            stage = error.stage(),
            "Render job failed: {}", message
        );
    }

    /// Lost a store write or cleanup; the job itself is unaffected.
    pub fn housekeeping_failed(&self, action: &str, message: &str) {
        warn!(job_id = %self.job_id, action, "Job housekeeping failed: {}", message);
    }

    /// The job never left `queued`.
    pub fn not_started(&self, reason: &str) {
        error!(job_id = %self.job_id, "Render job not started: {}", reason);
    }
}
