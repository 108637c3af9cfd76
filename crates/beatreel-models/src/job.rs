//! Render job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::job_status::JobStatus;
use crate::plan::ResolutionProfile;
use crate::request::RenderRequest;

/// Highest progress reported while still rendering. Only the transition to
/// `done` moves progress to 1.0.
pub const RENDERING_PROGRESS_CEILING: f64 = 0.99;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A mutation the owning runner applies to its job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    /// `queued -> rendering`
    StartRendering,
    /// Fraction of frames captured so far
    Progress(f64),
    /// `rendering -> done`
    Complete,
    /// `rendering -> failed` with a human-readable message
    Fail(String),
}

/// One render request's unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Fraction in [0, 1], non-decreasing
    pub progress: f64,
    pub request: RenderRequest,
    /// Chosen once at creation, fixed for the job's lifetime
    pub resolution: ResolutionProfile,
    pub total_frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for a validated request.
    pub fn new(id: JobId, request: RenderRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0.0,
            resolution: request.resolution(),
            total_frames: request.total_frames(),
            request,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an update, enforcing the state machine.
    ///
    /// Progress is clamped to `[0, RENDERING_PROGRESS_CEILING]` and never
    /// moves backwards; stale (lower) values are ignored.
    pub fn apply(&mut self, update: JobUpdate) -> ModelResult<()> {
        let now = Utc::now();
        match update {
            JobUpdate::StartRendering => {
                self.transition(JobStatus::Rendering)?;
                self.started_at = Some(now);
            }
            JobUpdate::Progress(value) => {
                if !value.is_finite() {
                    return Err(ModelError::InvalidProgress(value));
                }
                if self.status != JobStatus::Rendering {
                    return Err(ModelError::ProgressOutsideRendering(self.status));
                }
                let value = value.clamp(0.0, RENDERING_PROGRESS_CEILING);
                self.progress = self.progress.max(value);
            }
            JobUpdate::Complete => {
                self.transition(JobStatus::Done)?;
                self.progress = 1.0;
                self.finished_at = Some(now);
            }
            JobUpdate::Fail(message) => {
                self.transition(JobStatus::Failed)?;
                self.error_message = Some(message);
                self.finished_at = Some(now);
            }
        }
        self.updated_at = now;
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }
}
