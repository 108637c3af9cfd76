//! Model error types.

use thiserror::Error;

use crate::job_status::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("progress can only change while rendering (status: {0})")]
    ProgressOutsideRendering(JobStatus),

    #[error("invalid progress value: {0}")]
    InvalidProgress(f64),

    #[error("unknown plan: {0}")]
    UnknownPlan(String),
}

impl ModelError {
    pub fn invalid_transition(from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
