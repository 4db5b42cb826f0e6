use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobstore_core::JobStoreResult;
use jobstore_domain::{
    entities::TriggerRecord, repositories::TriggerRepository, JobKey, TriggerKey, TriggerState,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTriggerRepository {
    triggers: Arc<RwLock<BTreeMap<TriggerKey, TriggerRecord>>>,
}

impl InMemoryTriggerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerRepository for InMemoryTriggerRepository {
    async fn insert(&self, trigger: &TriggerRecord) -> JobStoreResult<bool> {
        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(&trigger.key) {
            return Ok(false);
        }
        triggers.insert(trigger.key.clone(), trigger.clone());
        Ok(true)
    }

    async fn save(&self, trigger: &TriggerRecord) -> JobStoreResult<()> {
        self.triggers
            .write()
            .await
            .insert(trigger.key.clone(), trigger.clone());
        Ok(())
    }

    async fn find(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>> {
        Ok(self.triggers.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        Ok(self.triggers.write().await.remove(key).is_some())
    }

    async fn find_by_job(&self, job_key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>> {
        Ok(self
            .triggers
            .read()
            .await
            .values()
            .filter(|t| &t.job_key == job_key)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> JobStoreResult<Vec<TriggerRecord>> {
        Ok(self.triggers.read().await.values().cloned().collect())
    }

    async fn find_due(
        &self,
        no_later_than: DateTime<Utc>,
        limit: usize,
    ) -> JobStoreResult<Vec<TriggerRecord>> {
        let mut due: Vec<TriggerRecord> = self
            .triggers
            .read()
            .await
            .values()
            .filter(|t| t.state == TriggerState::Waiting)
            .filter(|t| t.next_fire_time.is_some_and(|next| next <= no_later_than))
            .cloned()
            .collect();

        due.sort_by(|a, b| {
            a.next_fire_time
                .cmp(&b.next_fire_time)
                .then_with(|| b.priority.cmp(&a.priority))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn get_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>> {
        Ok(self.triggers.read().await.get(key).map(|t| t.state))
    }

    async fn transfer_state(
        &self,
        key: &TriggerKey,
        from: TriggerState,
        to: TriggerState,
    ) -> JobStoreResult<bool> {
        let mut triggers = self.triggers.write().await;
        match triggers.get_mut(key) {
            Some(trigger) if trigger.state == from => {
                trigger.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_state(&self, key: &TriggerKey, state: TriggerState) -> JobStoreResult<bool> {
        let mut triggers = self.triggers.write().await;
        match triggers.get_mut(key) {
            Some(trigger) => {
                trigger.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> JobStoreResult<usize> {
        Ok(self.triggers.read().await.len())
    }

    async fn clear(&self) -> JobStoreResult<()> {
        self.triggers.write().await.clear();
        Ok(())
    }
}
