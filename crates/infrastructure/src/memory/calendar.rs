use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::CalendarRecord, repositories::CalendarRepository};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCalendarRepository {
    calendars: Arc<RwLock<BTreeMap<String, CalendarRecord>>>,
}

impl InMemoryCalendarRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarRepository for InMemoryCalendarRepository {
    async fn insert(&self, calendar: &CalendarRecord) -> JobStoreResult<bool> {
        let mut calendars = self.calendars.write().await;
        if calendars.contains_key(&calendar.name) {
            return Ok(false);
        }
        calendars.insert(calendar.name.clone(), calendar.clone());
        Ok(true)
    }

    async fn save(&self, calendar: &CalendarRecord) -> JobStoreResult<()> {
        self.calendars
            .write()
            .await
            .insert(calendar.name.clone(), calendar.clone());
        Ok(())
    }

    async fn find(&self, name: &str) -> JobStoreResult<Option<CalendarRecord>> {
        Ok(self.calendars.read().await.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> JobStoreResult<bool> {
        Ok(self.calendars.write().await.remove(name).is_some())
    }

    async fn names(&self) -> JobStoreResult<Vec<String>> {
        Ok(self.calendars.read().await.keys().cloned().collect())
    }

    async fn count(&self) -> JobStoreResult<usize> {
        Ok(self.calendars.read().await.len())
    }

    async fn clear(&self) -> JobStoreResult<()> {
        self.calendars.write().await.clear();
        Ok(())
    }
}
