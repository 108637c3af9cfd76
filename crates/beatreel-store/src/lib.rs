//! Job registry.
//!
//! This crate provides:
//! - The [`JobStore`] seam the API and the runner share
//! - An in-process [`MemoryJobStore`] keyed by job id

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use store::JobStore;
