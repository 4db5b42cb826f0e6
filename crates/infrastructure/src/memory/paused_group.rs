use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{repositories::PausedGroupRepository, PausedGroupKind};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryPausedGroupRepository {
    groups: Arc<RwLock<HashSet<(PausedGroupKind, String)>>>,
}

impl InMemoryPausedGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PausedGroupRepository for InMemoryPausedGroupRepository {
    async fn add(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<()> {
        self.groups.write().await.insert((kind, group.to_string()));
        Ok(())
    }

    async fn remove(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool> {
        Ok(self.groups.write().await.remove(&(kind, group.to_string())))
    }

    async fn list(&self, kind: PausedGroupKind) -> JobStoreResult<HashSet<String>> {
        Ok(self
            .groups
            .read()
            .await
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, g)| g.clone())
            .collect())
    }

    async fn contains(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool> {
        Ok(self.groups.read().await.contains(&(kind, group.to_string())))
    }

    async fn clear(&self, kind: PausedGroupKind) -> JobStoreResult<()> {
        self.groups.write().await.retain(|(k, _)| *k != kind);
        Ok(())
    }
}
