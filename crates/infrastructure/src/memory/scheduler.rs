use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::SchedulerRecord, repositories::SchedulerRepository};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemorySchedulerRepository {
    records: Arc<RwLock<BTreeMap<(String, String), SchedulerRecord>>>,
}

impl InMemorySchedulerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerRepository for InMemorySchedulerRepository {
    async fn check_in(&self, record: &SchedulerRecord) -> JobStoreResult<()> {
        self.records.write().await.insert(
            (record.scheduler_name.clone(), record.instance_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn find_all(&self, scheduler_name: &str) -> JobStoreResult<Vec<SchedulerRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.scheduler_name == scheduler_name)
            .cloned()
            .collect())
    }

    async fn remove(&self, scheduler_name: &str, instance_id: &str) -> JobStoreResult<bool> {
        Ok(self
            .records
            .write()
            .await
            .remove(&(scheduler_name.to_string(), instance_id.to_string()))
            .is_some())
    }
}
