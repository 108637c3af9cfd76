//! Capture error types.

use std::time::Duration;
use thiserror::Error;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("visualizer unreachable: {0}")]
    Navigation(String),

    #[error("visualizer did not expose renderFrame within {}ms", .0.as_millis())]
    NotReady(Duration),

    #[error("capture target `{selector}` not found")]
    TargetMissing { selector: String },

    #[error("frame {frame} did not finish drawing within {}ms", .timeout.as_millis())]
    FrameStalled { frame: u64, timeout: Duration },

    #[error("visualizer script error: {0}")]
    Script(String),

    #[error("screenshot failed: {0}")]
    Screenshot(String),

    #[error("browser teardown failed: {0}")]
    Teardown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script(message.into())
    }

    pub fn screenshot(message: impl Into<String>) -> Self {
        Self::Screenshot(message.into())
    }
}
