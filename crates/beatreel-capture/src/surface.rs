//! The seams between the render driver and a concrete browser.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use beatreel_models::{RenderParams, ResolutionProfile};

use crate::error::CaptureResult;

/// One isolated browsing context showing the visualizer.
#[async_trait]
pub trait CaptureSurface: Send {
    /// Wait up to `timeout` for the page's `renderFrame` hook. `false` if it
    /// never appeared.
    async fn wait_until_ready(&mut self, timeout: Duration) -> CaptureResult<bool>;

    /// Resolve the capture target once; later captures reuse it.
    async fn locate_target(&mut self) -> CaptureResult<()>;

    /// Current value of the page's frame counter.
    async fn frame_counter(&mut self) -> CaptureResult<u64>;

    /// Invoke `renderFrame(time, params)` without waiting for it to settle.
    async fn render_frame(&mut self, time: f64, params: &RenderParams) -> CaptureResult<()>;

    /// Wait up to `timeout` for the counter to exceed `baseline`. `None` if
    /// it never did.
    async fn wait_for_counter_above(&mut self, baseline: u64, timeout: Duration) -> CaptureResult<Option<u64>>;

    /// Screenshot only the capture target to `path` as PNG.
    async fn capture_target(&mut self, path: &Path) -> CaptureResult<()>;

    /// Tear down the browsing context.
    async fn close(&mut self) -> CaptureResult<()>;
}

/// Opens a surface sized to a resolution profile, already navigated to the
/// visualizer in rendering mode.
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn launch(&self, resolution: ResolutionProfile) -> CaptureResult<Box<dyn CaptureSurface>>;
}

/// Receives a call after every captured frame.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn frame_captured(&self, captured: u64, total: u64);
}
