//! Media plumbing for the render pipeline.
//!
//! This crate provides:
//! - An FFmpeg command builder and runner with progress parsing and timeouts
//! - The frame-sequence + audio [`VideoEncoder`]
//! - The streaming HTTP [`AudioSource`]

pub mod command;
pub mod encode;
pub mod error;
pub mod fetch;
pub mod progress;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use encode::{EncodeSpec, EncoderConfig, FfmpegEncoder, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use fetch::{AudioSource, FetchConfig, HttpAudioFetcher};
pub use progress::FfmpegProgress;
