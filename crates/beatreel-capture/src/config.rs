//! Capture configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Render driver configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Visualizer page; opened with `render=1` plus the frame size
    pub visualizer_url: String,
    /// Chromium binary, autodetected when unset
    pub chromium_path: Option<PathBuf>,
    /// Deadline for `renderFrame` to appear
    pub ready_timeout: Duration,
    /// Deadline for each frame's counter to advance
    pub frame_timeout: Duration,
    pub navigation_timeout: Duration,
    /// CSS selector of the capture target
    pub selector: String,
    /// Global the page increments after each completed draw
    pub frame_counter: String,
    /// Needed when running as root in containers
    pub no_sandbox: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            visualizer_url: "http://localhost:3000/visualizer".to_string(),
            chromium_path: None,
            ready_timeout: Duration::from_secs(30),
            frame_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            selector: "canvas".to_string(),
            frame_counter: "__frameCount".to_string(),
            no_sandbox: false,
        }
    }
}

impl CaptureConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            visualizer_url: std::env::var("VISUALIZER_URL").unwrap_or(defaults.visualizer_url),
            chromium_path: std::env::var("CHROMIUM_PATH")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            ready_timeout: secs_from_env("CAPTURE_READY_TIMEOUT_SECS").unwrap_or(defaults.ready_timeout),
            frame_timeout: secs_from_env("CAPTURE_FRAME_TIMEOUT_SECS").unwrap_or(defaults.frame_timeout),
            navigation_timeout: secs_from_env("CAPTURE_NAVIGATION_TIMEOUT_SECS")
                .unwrap_or(defaults.navigation_timeout),
            selector: std::env::var("CAPTURE_SELECTOR").unwrap_or(defaults.selector),
            frame_counter: std::env::var("CAPTURE_FRAME_COUNTER").unwrap_or(defaults.frame_counter),
            no_sandbox: std::env::var("CAPTURE_NO_SANDBOX")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.no_sandbox),
        }
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}
