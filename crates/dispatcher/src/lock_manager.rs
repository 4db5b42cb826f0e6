//! 基于单记录唯一约束的互斥锁
//!
//! 锁记录存在即表示被持有。竞争失败不是错误，以 `false` 返回，调用方在下一轮重试。

use std::sync::Arc;

use jobstore_core::{Clock, JobStoreResult};
use jobstore_domain::{repositories::LockRepository, Key, LockRecord, LockType};
use tracing::{debug, info};

use crate::expiry::ExpiryCalculator;

pub struct LockManager {
    locks: Arc<dyn LockRepository>,
    expiry: ExpiryCalculator,
    clock: Arc<dyn Clock>,
    instance_id: String,
}

impl LockManager {
    pub fn new(
        locks: Arc<dyn LockRepository>,
        expiry: ExpiryCalculator,
        clock: Arc<dyn Clock>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            locks,
            expiry,
            clock,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn expiry(&self) -> &ExpiryCalculator {
        &self.expiry
    }

    /// 尝试加锁
    ///
    /// 插入冲突时读取已有锁：已过期则接管，仍有效或已被并发删除则返回 false。
    pub async fn try_lock(&self, lock_type: LockType, key: &Key) -> JobStoreResult<bool> {
        let lock = self.new_lock(lock_type, key);
        if self.locks.insert_if_absent(&lock).await? {
            info!("加锁成功: {} {} 持有者 {}", lock_type, key, self.instance_id);
            metrics::counter!("jobstore_locks_acquired_total", "type" => lock_type.as_str())
                .increment(1);
            return Ok(true);
        }

        match self.locks.find(lock_type, key).await? {
            None => {
                debug!("锁 {} {} 冲突后已被删除，等待下一轮", lock_type, key);
                Ok(false)
            }
            Some(existing) if self.expiry.is_lock_expired(&existing, self.clock.now()) => {
                self.take_over(&existing).await
            }
            Some(existing) => {
                debug!(
                    "锁 {} {} 被 {} 持有，加锁失败",
                    lock_type, key, existing.instance_id
                );
                Ok(false)
            }
        }
    }

    /// 接管已过期的锁
    ///
    /// 锁不存在或未过期时返回 false；与其他节点竞争接管失败也返回 false。
    pub async fn relock_expired(&self, lock_type: LockType, key: &Key) -> JobStoreResult<bool> {
        match self.locks.find(lock_type, key).await? {
            Some(existing) if self.expiry.is_lock_expired(&existing, self.clock.now()) => {
                self.take_over(&existing).await
            }
            Some(_) => Ok(false),
            None => {
                debug!("锁 {} {} 不存在，无需接管", lock_type, key);
                Ok(false)
            }
        }
    }

    /// 以比较删除加插入的方式把 `existing` 替换为本节点持有的锁，不检查是否过期
    pub async fn take_over(&self, existing: &LockRecord) -> JobStoreResult<bool> {
        if !self.locks.compare_and_delete(existing).await? {
            debug!(
                "锁 {} {} 已被其他节点替换，放弃接管",
                existing.lock_type, existing.key
            );
            return Ok(false);
        }

        let lock = self.new_lock(existing.lock_type, &existing.key);
        if !self.locks.insert_if_absent(&lock).await? {
            debug!(
                "锁 {} {} 删除后被其他节点抢先获取",
                existing.lock_type, existing.key
            );
            return Ok(false);
        }

        info!(
            "接管锁: {} {} 原持有者 {} 加锁时间 {}",
            existing.lock_type, existing.key, existing.instance_id, existing.locked_at
        );
        metrics::counter!("jobstore_locks_stolen_total", "type" => existing.lock_type.as_str())
            .increment(1);
        Ok(true)
    }

    /// 释放本节点持有的锁，未持有时不做任何事
    pub async fn unlock(&self, lock_type: LockType, key: &Key) -> JobStoreResult<()> {
        if self
            .locks
            .delete_if_owned(lock_type, key, &self.instance_id)
            .await?
        {
            debug!("释放锁: {} {}", lock_type, key);
        } else {
            debug!("锁 {} {} 不由本节点持有，忽略释放", lock_type, key);
        }
        Ok(())
    }

    pub async fn find_lock(&self, lock_type: LockType, key: &Key) -> JobStoreResult<Option<LockRecord>> {
        self.locks.find(lock_type, key).await
    }

    /// 本节点当前是否持有该锁
    pub async fn owns(&self, lock_type: LockType, key: &Key) -> JobStoreResult<bool> {
        Ok(self
            .locks
            .find(lock_type, key)
            .await?
            .is_some_and(|lock| lock.instance_id == self.instance_id))
    }

    /// 是否被其他节点持有且尚未过期
    pub async fn is_locked_by_other(&self, lock_type: LockType, key: &Key) -> JobStoreResult<bool> {
        Ok(match self.locks.find(lock_type, key).await? {
            Some(lock) => {
                lock.instance_id != self.instance_id
                    && !self.expiry.is_lock_expired(&lock, self.clock.now())
            }
            None => false,
        })
    }

    pub async fn find_all(&self) -> JobStoreResult<Vec<LockRecord>> {
        self.locks.find_all().await
    }

    /// 已过期、可被接管的锁
    pub async fn expired_locks(&self, lock_type: LockType) -> JobStoreResult<Vec<LockRecord>> {
        let now = self.clock.now();
        Ok(self
            .locks
            .find_all()
            .await?
            .into_iter()
            .filter(|lock| lock.lock_type == lock_type && self.expiry.is_lock_expired(lock, now))
            .collect())
    }

    fn new_lock(&self, lock_type: LockType, key: &Key) -> LockRecord {
        LockRecord::new(lock_type, key.clone(), self.instance_id.clone(), self.clock.now())
    }
}
