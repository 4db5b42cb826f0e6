use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::LockRecord, repositories::LockRepository, Key, LockType};
use tokio::sync::Mutex;

type LockId = (&'static str, Key);

/// 写锁内完成检查与写入，等价于唯一约束
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockRepository {
    locks: Arc<Mutex<BTreeMap<LockId, LockRecord>>>,
}

impl InMemoryLockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(lock_type: LockType, key: &Key) -> LockId {
        (lock_type.as_str(), key.clone())
    }
}

#[async_trait]
impl LockRepository for InMemoryLockRepository {
    async fn insert_if_absent(&self, lock: &LockRecord) -> JobStoreResult<bool> {
        let mut locks = self.locks.lock().await;
        let id = Self::id(lock.lock_type, &lock.key);
        if locks.contains_key(&id) {
            return Ok(false);
        }
        locks.insert(id, lock.clone());
        Ok(true)
    }

    async fn find(&self, lock_type: LockType, key: &Key) -> JobStoreResult<Option<LockRecord>> {
        Ok(self.locks.lock().await.get(&Self::id(lock_type, key)).cloned())
    }

    async fn compare_and_delete(&self, expected: &LockRecord) -> JobStoreResult<bool> {
        let mut locks = self.locks.lock().await;
        let id = Self::id(expected.lock_type, &expected.key);
        match locks.get(&id) {
            Some(current)
                if current.instance_id == expected.instance_id
                    && current.locked_at == expected.locked_at =>
            {
                locks.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_owned(
        &self,
        lock_type: LockType,
        key: &Key,
        instance_id: &str,
    ) -> JobStoreResult<bool> {
        let mut locks = self.locks.lock().await;
        let id = Self::id(lock_type, key);
        match locks.get(&id) {
            Some(current) if current.instance_id == instance_id => {
                locks.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_all(&self) -> JobStoreResult<Vec<LockRecord>> {
        Ok(self.locks.lock().await.values().cloned().collect())
    }
}
