use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::JobRecord, repositories::JobRepository, JobKey};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<BTreeMap<JobKey, JobRecord>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &JobRecord) -> JobStoreResult<bool> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.key) {
            return Ok(false);
        }
        jobs.insert(job.key.clone(), job.clone());
        Ok(true)
    }

    async fn save(&self, job: &JobRecord) -> JobStoreResult<()> {
        self.jobs.write().await.insert(job.key.clone(), job.clone());
        Ok(())
    }

    async fn find(&self, key: &JobKey) -> JobStoreResult<Option<JobRecord>> {
        Ok(self.jobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &JobKey) -> JobStoreResult<bool> {
        Ok(self.jobs.write().await.remove(key).is_some())
    }

    async fn find_all(&self) -> JobStoreResult<Vec<JobRecord>> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn count(&self) -> JobStoreResult<usize> {
        Ok(self.jobs.read().await.len())
    }

    async fn clear(&self) -> JobStoreResult<()> {
        self.jobs.write().await.clear();
        Ok(())
    }
}
