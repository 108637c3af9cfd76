//! Shared data models for the beatreel render service.
//!
//! This crate provides Serde-serializable types for:
//! - Render requests and their validation
//! - Quality plans and resolution profiles
//! - Render parameters handed to the visualizer page
//! - Jobs, job identifiers and the job state machine

pub mod error;
pub mod frames;
pub mod job;
pub mod job_status;
pub mod params;
pub mod plan;
pub mod request;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use frames::{frame_file_name, total_frames, FRAME_PATTERN};
pub use job::{Job, JobId, JobUpdate, RENDERING_PROGRESS_CEILING};
pub use job_status::JobStatus;
pub use params::RenderParams;
pub use plan::{Plan, ResolutionProfile, FRAME_RATE};
pub use request::{
    detect_audio_extension, ExportRequestBody, FieldViolation, RenderRequest, MAX_DURATION_SECS,
    SUPPORTED_AUDIO_EXTENSIONS,
};
