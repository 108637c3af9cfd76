//! Worker metrics. Exported by whichever binary installs a recorder.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "beatreel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "beatreel_jobs_failed_total";
    pub const JOBS_RUNNING: &str = "beatreel_jobs_running";
    pub const JOB_DURATION_SECONDS: &str = "beatreel_job_duration_seconds";
    pub const FRAMES_CAPTURED_TOTAL: &str = "beatreel_frames_captured_total";
    pub const ENCODE_DURATION_SECONDS: &str = "beatreel_encode_duration_seconds";
    pub const AUDIO_FETCH_DURATION_SECONDS: &str = "beatreel_audio_fetch_duration_seconds";
}

pub fn record_job_completed(plan: &str, elapsed: Duration) {
    let labels = [("plan", plan.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

pub fn record_job_failed(plan: &str, stage: &str) {
    let labels = [("plan", plan.to_string()), ("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn set_running_jobs(count: usize) {
    gauge!(names::JOBS_RUNNING).set(count as f64);
}

pub fn record_frame_captured() {
    counter!(names::FRAMES_CAPTURED_TOTAL).increment(1);
}

pub fn record_encode_duration(elapsed: Duration) {
    histogram!(names::ENCODE_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_audio_fetch_duration(elapsed: Duration) {
    histogram!(names::AUDIO_FETCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
}
