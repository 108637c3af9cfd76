//! Render job runner.
//!
//! This crate provides:
//! - The [`JobRunner`] that takes a queued job through capture, audio fetch
//!   and encode to a terminal state
//! - Per-job working directories
//! - Structured job logging and worker metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod workdir;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use runner::JobRunner;
pub use workdir::WorkDir;
