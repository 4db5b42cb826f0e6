//! 内存存储实现
//!
//! 与 SQLite 实现语义一致，适用于单进程嵌入和测试。克隆得到的仓储共享同一份数据，
//! 可用来模拟多个节点访问同一个存储。

mod calendar;
mod job;
mod lock;
mod paused_group;
mod scheduler;
mod trigger;

use std::sync::Arc;

use jobstore_domain::Repositories;

pub use calendar::InMemoryCalendarRepository;
pub use job::InMemoryJobRepository;
pub use lock::InMemoryLockRepository;
pub use paused_group::InMemoryPausedGroupRepository;
pub use scheduler::InMemorySchedulerRepository;
pub use trigger::InMemoryTriggerRepository;

/// 一套共享数据的内存仓储
pub fn in_memory_repositories() -> Repositories {
    Repositories {
        jobs: Arc::new(InMemoryJobRepository::new()),
        triggers: Arc::new(InMemoryTriggerRepository::new()),
        locks: Arc::new(InMemoryLockRepository::new()),
        schedulers: Arc::new(InMemorySchedulerRepository::new()),
        paused_groups: Arc::new(InMemoryPausedGroupRepository::new()),
        calendars: Arc::new(InMemoryCalendarRepository::new()),
    }
}
