//! Deterministic frame capture loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use beatreel_models::{frame_file_name, Job, RenderParams, ResolutionProfile, FRAME_RATE};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::{CaptureError, CaptureResult};
use crate::surface::{CaptureSurface, ProgressSink, SurfaceLauncher};

/// Slack on top of in-page deadlines before the driver gives up on the
/// browser itself.
const DEVTOOLS_GRACE: Duration = Duration::from_secs(5);

/// What to capture for one job.
#[derive(Debug, Clone)]
pub struct CapturePlan {
    pub resolution: ResolutionProfile,
    pub params: RenderParams,
    pub fps: u32,
    pub total_frames: u64,
    pub frames_dir: PathBuf,
}

impl CapturePlan {
    pub fn for_job(job: &Job, frames_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolution: job.resolution,
            params: RenderParams::for_request(&job.request),
            fps: FRAME_RATE,
            total_frames: job.total_frames,
            frames_dir: frames_dir.into(),
        }
    }

    /// Timestep of frame `index`.
    pub fn frame_time(&self, index: u64) -> f64 {
        index as f64 / f64::from(self.fps)
    }
}

/// Owns a surface until it is released; warns when dropped without an
/// orderly close so the destructor-based teardown is visible in logs.
struct SurfaceGuard {
    surface: Box<dyn CaptureSurface>,
    closed: bool,
}

impl SurfaceGuard {
    fn new(surface: Box<dyn CaptureSurface>) -> Self {
        Self {
            surface,
            closed: false,
        }
    }

    async fn release(mut self) -> CaptureResult<()> {
        self.closed = true;
        self.surface.close().await
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Capture surface dropped without close(), relying on drop teardown");
        }
    }
}

/// Drives a visualizer surface through every timestep of a [`CapturePlan`].
pub struct RenderDriver {
    launcher: Arc<dyn SurfaceLauncher>,
    ready_timeout: Duration,
    frame_timeout: Duration,
    devtools_grace: Duration,
}

impl RenderDriver {
    pub fn new(launcher: Arc<dyn SurfaceLauncher>, config: &CaptureConfig) -> Self {
        Self {
            launcher,
            ready_timeout: config.ready_timeout,
            frame_timeout: config.frame_timeout,
            devtools_grace: DEVTOOLS_GRACE,
        }
    }

    /// Override the slack granted to a page call that ignores its own deadline.
    pub fn with_devtools_grace(mut self, grace: Duration) -> Self {
        self.devtools_grace = grace;
        self
    }

    /// Capture `plan.total_frames` frames into `plan.frames_dir`, returning
    /// the number written. The surface is closed whether or not capture
    /// succeeds.
    pub async fn capture(&self, plan: &CapturePlan, sink: &dyn ProgressSink) -> CaptureResult<u64> {
        tokio::fs::create_dir_all(&plan.frames_dir).await?;

        let surface = self.launcher.launch(plan.resolution).await?;
        let mut guard = SurfaceGuard::new(surface);

        let result = self.drive(guard.surface.as_mut(), plan, sink).await;
        let closed = guard.release().await;

        match (result, closed) {
            (Ok(frames), Ok(())) => Ok(frames),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Surface teardown also failed: {}", close_err);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        surface: &mut dyn CaptureSurface,
        plan: &CapturePlan,
        sink: &dyn ProgressSink,
    ) -> CaptureResult<u64> {
        let ready = bounded(
            self.ready_timeout + self.devtools_grace,
            surface.wait_until_ready(self.ready_timeout),
            || CaptureError::NotReady(self.ready_timeout),
        )
        .await?;
        if !ready {
            return Err(CaptureError::NotReady(self.ready_timeout));
        }

        surface.locate_target().await?;
        debug!(
            total_frames = plan.total_frames,
            resolution = %plan.resolution,
            "Visualizer ready, capturing"
        );

        for index in 0..plan.total_frames {
            let stalled = || CaptureError::FrameStalled {
                frame: index,
                timeout: self.frame_timeout,
            };

            let baseline = bounded(self.frame_timeout, surface.frame_counter(), stalled).await?;

            bounded(
                self.frame_timeout,
                surface.render_frame(plan.frame_time(index), &plan.params),
                stalled,
            )
            .await?;

            bounded(
                self.frame_timeout + self.devtools_grace,
                surface.wait_for_counter_above(baseline, self.frame_timeout),
                stalled,
            )
            .await?
            .ok_or_else(stalled)?;

            let path = plan.frames_dir.join(frame_file_name(index));
            bounded(self.frame_timeout, surface.capture_target(&path), || {
                CaptureError::screenshot(format!("frame {} timed out", index))
            })
            .await?;

            sink.frame_captured(index + 1, plan.total_frames).await;
        }

        info!(frames = plan.total_frames, "Frame capture complete");
        Ok(plan.total_frames)
    }
}

async fn bounded<T, F, E>(limit: Duration, fut: F, on_timeout: E) -> CaptureResult<T>
where
    F: Future<Output = CaptureResult<T>>,
    E: FnOnce() -> CaptureError,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
