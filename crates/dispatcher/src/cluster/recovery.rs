//! 启动时恢复失效节点遗留的锁与触发器
//!
//! 失效节点：`last_checkin + checkin_interval` 早于当前时间的成员记录，以及本节点自身
//! （同一实例ID在上次运行中遗留的锁）。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobstore_core::{Clock, JobStoreResult};
use jobstore_domain::{LockRecord, LockType, Repositories, TriggerState};
use tracing::{debug, info, warn};

use crate::lock_manager::LockManager;
use crate::persister::TriggerPersister;
use crate::trigger_state_manager::TriggerStateManager;

/// 一次恢复的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub dead_instances: Vec<String>,
    /// 标记为恢复执行的触发器
    pub recovered_triggers: usize,
    /// 重新排队但不标记恢复的触发器
    pub requeued_triggers: usize,
    pub removed_triggers: usize,
    pub released_job_locks: usize,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.recovered_triggers == 0
            && self.requeued_triggers == 0
            && self.removed_triggers == 0
            && self.released_job_locks == 0
    }
}

enum Outcome {
    Recovered,
    Requeued,
    Removed,
    Untouched,
}

pub struct TriggerRecoverer {
    repos: Repositories,
    lock_manager: Arc<LockManager>,
    state_manager: Arc<TriggerStateManager>,
    persister: Arc<TriggerPersister>,
    clock: Arc<dyn Clock>,
    scheduler_name: String,
}

impl TriggerRecoverer {
    pub fn new(
        repos: Repositories,
        lock_manager: Arc<LockManager>,
        state_manager: Arc<TriggerStateManager>,
        persister: Arc<TriggerPersister>,
        clock: Arc<dyn Clock>,
        scheduler_name: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            lock_manager,
            state_manager,
            persister,
            clock,
            scheduler_name: scheduler_name.into(),
        }
    }

    /// 失效节点集合，始终包含本节点
    pub async fn dead_instances(&self, now: DateTime<Utc>) -> JobStoreResult<HashSet<String>> {
        let own = self.lock_manager.instance_id().to_string();
        let mut dead: HashSet<String> = self
            .repos
            .schedulers
            .find_all(&self.scheduler_name)
            .await?
            .into_iter()
            .filter(|record| {
                record.instance_id != own
                    && self.lock_manager.expiry().is_scheduler_dead(record, now)
            })
            .map(|record| record.instance_id)
            .collect();
        dead.insert(own);
        Ok(dead)
    }

    /// 释放失效节点的锁并重新排队其触发器；重复执行没有额外效果
    pub async fn recover(&self) -> JobStoreResult<RecoveryReport> {
        let now = self.clock.now();
        let dead = self.dead_instances(now).await?;
        let orphaned: Vec<LockRecord> = self
            .lock_manager
            .find_all()
            .await?
            .into_iter()
            .filter(|lock| dead.contains(&lock.instance_id))
            .collect();

        let mut report = RecoveryReport {
            dead_instances: {
                let mut ids: Vec<String> = dead.iter().cloned().collect();
                ids.sort();
                ids
            },
            ..Default::default()
        };

        let (trigger_locks, job_locks): (Vec<_>, Vec<_>) = orphaned
            .into_iter()
            .partition(|lock| lock.lock_type == LockType::Trigger);

        for lock in &trigger_locks {
            if !self.lock_manager.take_over(lock).await? {
                continue;
            }
            let outcome = self.recover_trigger(lock, now).await;
            self.lock_manager.unlock(LockType::Trigger, &lock.key).await?;
            match outcome? {
                Outcome::Recovered => report.recovered_triggers += 1,
                Outcome::Requeued => report.requeued_triggers += 1,
                Outcome::Removed => report.removed_triggers += 1,
                Outcome::Untouched => {}
            }
        }

        for lock in &job_locks {
            if !self.repos.locks.compare_and_delete(lock).await? {
                continue;
            }
            debug!("释放失效节点 {} 的作业锁 {}", lock.instance_id, lock.key);
            self.state_manager.unblock_siblings(&lock.key).await?;
            report.released_job_locks += 1;
        }

        let own = self.lock_manager.instance_id();
        for instance_id in dead.iter().filter(|id| id.as_str() != own) {
            if self
                .repos
                .schedulers
                .remove(&self.scheduler_name, instance_id)
                .await?
            {
                info!("移除失效节点的成员记录: {}", instance_id);
            }
        }

        if report.is_empty() {
            debug!("没有需要恢复的触发器");
        } else {
            info!(
                "恢复完成: 恢复执行 {} 个, 重新排队 {} 个, 删除 {} 个, 释放作业锁 {} 个",
                report.recovered_triggers,
                report.requeued_triggers,
                report.removed_triggers,
                report.released_job_locks
            );
            metrics::counter!("jobstore_triggers_recovered_total")
                .increment(report.recovered_triggers as u64);
        }
        Ok(report)
    }

    async fn recover_trigger(&self, lock: &LockRecord, now: DateTime<Utc>) -> JobStoreResult<Outcome> {
        let Some(mut trigger) = self.repos.triggers.find(&lock.key).await? else {
            return Ok(Outcome::Untouched);
        };

        let Some(job) = self.repos.jobs.find(&trigger.job_key).await? else {
            warn!("触发器 {} 的作业 {} 不存在，删除触发器", trigger.key, trigger.job_key);
            self.repos.triggers.delete(&trigger.key).await?;
            return Ok(Outcome::Removed);
        };

        let paused = trigger.state.is_paused() || self.state_manager.is_group_paused(&trigger).await?;
        let target = if paused {
            TriggerState::Paused
        } else {
            TriggerState::Waiting
        };

        if job.requests_recovery {
            info!(
                "恢复触发器 {} 原持有者 {}，作业 {} 将重新执行",
                trigger.key, lock.instance_id, job.key
            );
            trigger.state = target;
            trigger.recovering = true;
            trigger.next_fire_time = Some(now);
            trigger.fire_instance_id = None;
            self.repos.triggers.save(&trigger).await?;
            return Ok(Outcome::Recovered);
        }

        if trigger.next_fire_time.is_none() {
            // 单次触发器已经触发过，或重复触发器已耗尽
            debug!("触发器 {} 已没有后续触发，删除", trigger.key);
            self.persister.remove_trigger(&trigger.key).await?;
            return Ok(Outcome::Removed);
        }

        debug!("触发器 {} 重新排队为 {}", trigger.key, target);
        trigger.state = target;
        trigger.recovering = false;
        trigger.fire_instance_id = None;
        self.repos.triggers.save(&trigger).await?;
        Ok(Outcome::Requeued)
    }
}
