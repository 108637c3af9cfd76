//! Application state.

use std::sync::Arc;

use beatreel_store::{JobStore, MemoryJobStore};
use beatreel_worker::{JobRunner, WorkerResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub runner: Arc<JobRunner>,
}

impl AppState {
    pub fn new(config: ApiConfig, store: Arc<dyn JobStore>, runner: Arc<JobRunner>) -> Self {
        Self {
            config,
            store,
            runner,
        }
    }

    /// In-memory store and a runner wired to Chromium, HTTP audio and
    /// FFmpeg.
    pub fn from_env(config: ApiConfig) -> WorkerResult<Self> {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let runner = JobRunner::from_env(Arc::clone(&store))?;
        Ok(Self::new(config, store, Arc::new(runner)))
    }
}
