//! Render driver for the browser-hosted visualizer.
//!
//! Frames are captured one timestep at a time: invoke `renderFrame(t, params)`,
//! wait for the page's frame counter to move past its previous value, then
//! screenshot the capture target. The browsing context is torn down on every
//! exit path.

pub mod chrome;
pub mod config;
pub mod driver;
pub mod error;
pub mod surface;

pub use chrome::ChromeLauncher;
pub use config::CaptureConfig;
pub use driver::{CapturePlan, RenderDriver};
pub use error::{CaptureError, CaptureResult};
pub use surface::{CaptureSurface, ProgressSink, SurfaceLauncher};
