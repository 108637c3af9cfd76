//! The job registry seam.

use async_trait::async_trait;
use beatreel_models::{Job, JobId, JobUpdate, RenderRequest};

use crate::error::StoreResult;

/// Registry of render jobs keyed by [`JobId`].
///
/// Lookups hand out snapshots; the only way to mutate a job is
/// [`JobStore::update`], which applies the state machine atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Register a new queued job under a fresh unique id.
    async fn create(&self, request: RenderRequest) -> StoreResult<Job>;

    /// Snapshot of a job, `None` if the id is unknown.
    async fn get(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Apply an update and return the resulting snapshot.
    async fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<Job>;

    /// Number of registered jobs.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
