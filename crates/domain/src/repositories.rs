//! 存储端口
//!
//! 每个逻辑集合一个仓储接口。协调的正确性只依赖单条记录写入的原子性
//! 和锁键的唯一约束，不要求跨记录事务。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobstore_core::JobStoreResult;

use crate::entities::{CalendarRecord, JobRecord, LockRecord, SchedulerRecord, TriggerRecord};
use crate::value_objects::{JobKey, Key, LockType, PausedGroupKind, TriggerKey, TriggerState};

/// 作业仓储
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 键已存在时返回 false
    async fn insert(&self, job: &JobRecord) -> JobStoreResult<bool>;
    async fn save(&self, job: &JobRecord) -> JobStoreResult<()>;
    async fn find(&self, key: &JobKey) -> JobStoreResult<Option<JobRecord>>;
    async fn delete(&self, key: &JobKey) -> JobStoreResult<bool>;
    async fn find_all(&self) -> JobStoreResult<Vec<JobRecord>>;
    async fn count(&self) -> JobStoreResult<usize>;
    async fn clear(&self) -> JobStoreResult<()>;
}

/// 触发器仓储
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// 键已存在时返回 false
    async fn insert(&self, trigger: &TriggerRecord) -> JobStoreResult<bool>;
    async fn save(&self, trigger: &TriggerRecord) -> JobStoreResult<()>;
    async fn find(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>>;
    async fn delete(&self, key: &TriggerKey) -> JobStoreResult<bool>;
    async fn find_by_job(&self, job_key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>>;
    async fn find_all(&self) -> JobStoreResult<Vec<TriggerRecord>>;
    /// WAITING 且 `next_fire_time <= no_later_than` 的触发器，
    /// 按 (next_fire_time 升序, priority 降序) 排序
    async fn find_due(
        &self,
        no_later_than: DateTime<Utc>,
        limit: usize,
    ) -> JobStoreResult<Vec<TriggerRecord>>;
    async fn get_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>>;
    /// 仅当当前状态为 `from` 时写入 `to`
    async fn transfer_state(
        &self,
        key: &TriggerKey,
        from: TriggerState,
        to: TriggerState,
    ) -> JobStoreResult<bool>;
    async fn update_state(&self, key: &TriggerKey, state: TriggerState) -> JobStoreResult<bool>;
    async fn count(&self) -> JobStoreResult<usize>;
    async fn clear(&self) -> JobStoreResult<()>;
}

/// 锁仓储
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// 唯一约束冲突时返回 false
    async fn insert_if_absent(&self, lock: &LockRecord) -> JobStoreResult<bool>;
    async fn find(&self, lock_type: LockType, key: &Key) -> JobStoreResult<Option<LockRecord>>;
    /// 仅当持有者和加锁时间都与 `expected` 一致时删除
    async fn compare_and_delete(&self, expected: &LockRecord) -> JobStoreResult<bool>;
    async fn delete_if_owned(
        &self,
        lock_type: LockType,
        key: &Key,
        instance_id: &str,
    ) -> JobStoreResult<bool>;
    async fn find_all(&self) -> JobStoreResult<Vec<LockRecord>>;
}

/// 集群成员仓储
#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// 按 (scheduler_name, instance_id) 插入或更新
    async fn check_in(&self, record: &SchedulerRecord) -> JobStoreResult<()>;
    async fn find_all(&self, scheduler_name: &str) -> JobStoreResult<Vec<SchedulerRecord>>;
    async fn remove(&self, scheduler_name: &str, instance_id: &str) -> JobStoreResult<bool>;
}

/// 暂停分组仓储
#[async_trait]
pub trait PausedGroupRepository: Send + Sync {
    async fn add(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<()>;
    async fn remove(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool>;
    async fn list(&self, kind: PausedGroupKind) -> JobStoreResult<HashSet<String>>;
    async fn contains(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool>;
    async fn clear(&self, kind: PausedGroupKind) -> JobStoreResult<()>;
}

/// 日历仓储
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    async fn insert(&self, calendar: &CalendarRecord) -> JobStoreResult<bool>;
    async fn save(&self, calendar: &CalendarRecord) -> JobStoreResult<()>;
    async fn find(&self, name: &str) -> JobStoreResult<Option<CalendarRecord>>;
    async fn delete(&self, name: &str) -> JobStoreResult<bool>;
    async fn names(&self) -> JobStoreResult<Vec<String>>;
    async fn count(&self) -> JobStoreResult<usize>;
    async fn clear(&self) -> JobStoreResult<()>;
}

/// 一套存储实现的全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub triggers: Arc<dyn TriggerRepository>,
    pub locks: Arc<dyn LockRepository>,
    pub schedulers: Arc<dyn SchedulerRepository>,
    pub paused_groups: Arc<dyn PausedGroupRepository>,
    pub calendars: Arc<dyn CalendarRepository>,
}
