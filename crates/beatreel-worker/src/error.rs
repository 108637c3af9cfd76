//! Worker error types.
//!
//! The `Display` of a [`WorkerError`] becomes the job's terminal message, so
//! each variant names the stage that failed.

use beatreel_capture::CaptureError;
use beatreel_media::MediaError;
use beatreel_store::StoreError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("render failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("audio fetch failed: {0}")]
    AudioFetch(MediaError),

    #[error("encode failed: {0}")]
    Encode(MediaError),

    #[error("job exceeded the {0}s deadline")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short stage label for logs and metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Capture(_) => "render",
            Self::AudioFetch(_) => "audio",
            Self::Encode(_) => "encode",
            Self::Timeout(_) => "timeout",
            Self::Store(_) => "store",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
