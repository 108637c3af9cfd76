//! In-memory job registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use beatreel_models::{Job, JobId, JobUpdate, RenderRequest};

use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

/// Jobs held in process memory for the lifetime of the server.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, request: RenderRequest) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().await;

        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }

        let job = Job::new(id.clone(), request);
        jobs.insert(id, job.clone());
        debug!(job_id = %job.id, total_frames = job.total_frames, "Job registered");
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Err(e) = job.apply(update) {
            warn!(job_id = %id, status = %job.status, "Rejected job update: {}", e);
            return Err(e.into());
        }
        Ok(job.clone())
    }

    async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
