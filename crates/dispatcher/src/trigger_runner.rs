//! 调度热路径：获取到期触发器、确认触发、释放
//!
//! 获取顺序为 (next_fire_time 升序, priority 降序)。每个触发器先加锁再改状态，
//! 加锁后的任何失败都会释放锁。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jobstore_core::{Clock, JobStoreResult};
use jobstore_domain::{
    FireVeto, JobKey, JobRecord, LockType, PausedGroupKind, Repositories, ScheduleCalculator,
    TriggerFiredBundle, TriggerFiredResult, TriggerKey, TriggerRecord, TriggerState,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::lock_manager::LockManager;
use crate::trigger_state_manager::TriggerStateManager;

/// 触发器获取配置
#[derive(Debug, Clone)]
pub struct TriggerRunnerConfig {
    /// 超过该时长仍未触发即视为错过
    pub misfire_threshold: Duration,
    /// 查询时在请求数量之外多取的条数，用于抵消竞争失败
    pub over_fetch: usize,
}

impl Default for TriggerRunnerConfig {
    fn default() -> Self {
        Self {
            misfire_threshold: Duration::milliseconds(5_000),
            over_fetch: 10,
        }
    }
}

pub struct TriggerRunner {
    repos: Repositories,
    lock_manager: Arc<LockManager>,
    state_manager: Arc<TriggerStateManager>,
    calculator: Arc<dyn ScheduleCalculator>,
    clock: Arc<dyn Clock>,
    config: TriggerRunnerConfig,
}

/// 单个候选的处理结果
enum Candidate {
    Acquired(TriggerRecord),
    Skipped,
}

/// 一轮获取中共享的查询结果
struct AcquireBatch {
    horizon: DateTime<Utc>,
    paused_trigger_groups: HashSet<String>,
    paused_job_groups: HashSet<String>,
    jobs: HashMap<JobKey, Option<JobRecord>>,
    /// 本轮已获取的不允许并发的作业
    exclusive_jobs: HashSet<JobKey>,
}

impl TriggerRunner {
    pub fn new(
        repos: Repositories,
        lock_manager: Arc<LockManager>,
        state_manager: Arc<TriggerStateManager>,
        calculator: Arc<dyn ScheduleCalculator>,
        clock: Arc<dyn Clock>,
        config: Option<TriggerRunnerConfig>,
    ) -> Self {
        Self {
            repos,
            lock_manager,
            state_manager,
            calculator,
            clock,
            config: config.unwrap_or_default(),
        }
    }

    /// 获取 `next_fire_time <= no_later_than + time_window` 的触发器，最多 `max_count` 个
    ///
    /// 存储中可获取的触发器不足 `max_count` 是正常情况。
    pub async fn acquire_next(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: Duration,
    ) -> JobStoreResult<Vec<TriggerRecord>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let horizon = no_later_than + time_window;
        let limit = max_count.saturating_mul(2).max(max_count + self.config.over_fetch);
        let mut candidates = self.repos.triggers.find_due(horizon, limit).await?;
        candidates.extend(self.stale_acquisitions(horizon).await?);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        candidates.sort_by(|a, b| {
            a.next_fire_time
                .cmp(&b.next_fire_time)
                .then_with(|| b.priority.cmp(&a.priority))
        });

        let mut batch = AcquireBatch {
            horizon,
            paused_trigger_groups: self.repos.paused_groups.list(PausedGroupKind::Trigger).await?,
            paused_job_groups: self.repos.paused_groups.list(PausedGroupKind::Job).await?,
            jobs: HashMap::new(),
            exclusive_jobs: HashSet::new(),
        };
        let mut acquired = Vec::new();

        for candidate in candidates {
            if acquired.len() >= max_count {
                break;
            }
            match self.try_acquire(candidate, &mut batch).await {
                Ok(Some(trigger)) => acquired.push(trigger),
                Ok(None) => {}
                Err(e) if acquired.is_empty() => return Err(e),
                Err(e) => {
                    error!("获取触发器中断，返回已获取的 {} 个: {}", acquired.len(), e);
                    break;
                }
            }
        }

        if !acquired.is_empty() {
            metrics::counter!("jobstore_triggers_acquired_total").increment(acquired.len() as u64);
            debug!("本轮获取 {} 个触发器", acquired.len());
        }
        Ok(acquired)
    }

    /// 触发器锁已过期的 ACQUIRED 触发器：获取它的节点未能在超时内完成这次触发
    ///
    /// 只从过期的锁出发查找，仍在执行中的触发器不会挤占到期查询的名额。
    async fn stale_acquisitions(&self, horizon: DateTime<Utc>) -> JobStoreResult<Vec<TriggerRecord>> {
        let mut stale = Vec::new();
        for lock in self.lock_manager.expired_locks(LockType::Trigger).await? {
            let Some(trigger) = self.repos.triggers.find(&lock.key).await? else {
                continue;
            };
            if trigger.state == TriggerState::Acquired
                && trigger.next_fire_time.is_some_and(|next| next <= horizon)
            {
                stale.push(trigger);
            }
        }
        Ok(stale)
    }

    async fn try_acquire(
        &self,
        candidate: TriggerRecord,
        batch: &mut AcquireBatch,
    ) -> JobStoreResult<Option<TriggerRecord>> {
        if batch.paused_trigger_groups.contains(&candidate.key.group)
            || batch.paused_job_groups.contains(&candidate.job_key.group)
        {
            return Ok(None);
        }

        let job = match batch.jobs.get(&candidate.job_key) {
            Some(job) => job.clone(),
            None => {
                let job = self.repos.jobs.find(&candidate.job_key).await?;
                batch.jobs.insert(candidate.job_key.clone(), job.clone());
                job
            }
        };
        let Some(job) = job else {
            warn!("触发器 {} 引用的作业 {} 不存在，跳过", candidate.key, candidate.job_key);
            return Ok(None);
        };

        if job.concurrent_execution_disallowed {
            if batch.exclusive_jobs.contains(&job.key) {
                return Ok(None);
            }
            if self
                .lock_manager
                .is_locked_by_other(LockType::Job, &job.key)
                .await?
            {
                debug!("作业 {} 正在其他节点执行，跳过触发器 {}", job.key, candidate.key);
                return Ok(None);
            }
        }

        if !self
            .lock_manager
            .try_lock(LockType::Trigger, &candidate.key)
            .await?
        {
            return Ok(None);
        }

        let key = candidate.key.clone();
        match self.acquire_locked(candidate, batch.horizon).await {
            Ok(Candidate::Acquired(trigger)) => {
                if job.concurrent_execution_disallowed {
                    batch.exclusive_jobs.insert(job.key);
                }
                Ok(Some(trigger))
            }
            Ok(Candidate::Skipped) => {
                self.lock_manager.unlock(LockType::Trigger, &key).await?;
                Ok(None)
            }
            Err(e) => {
                if let Err(unlock_err) = self.lock_manager.unlock(LockType::Trigger, &key).await {
                    error!("释放触发器锁 {} 失败: {}", key, unlock_err);
                }
                Err(e)
            }
        }
    }

    /// 已持有触发器锁，重新读取并校验后标记为 ACQUIRED
    async fn acquire_locked(
        &self,
        candidate: TriggerRecord,
        horizon: DateTime<Utc>,
    ) -> JobStoreResult<Candidate> {
        // 查询与加锁之间触发器可能已被其他节点触发并推进
        let Some(mut trigger) = self.repos.triggers.find(&candidate.key).await? else {
            return Ok(Candidate::Skipped);
        };
        let still_due = matches!(trigger.state, TriggerState::Waiting | TriggerState::Acquired)
            && trigger.next_fire_time.is_some_and(|next| next <= horizon);
        if !still_due {
            debug!("触发器 {} 已不再到期，放弃", trigger.key);
            return Ok(Candidate::Skipped);
        }

        if trigger.state == TriggerState::Acquired {
            info!(
                "接管已过期的触发器 {} 原触发实例 {:?}",
                trigger.key, trigger.fire_instance_id
            );
        }

        let now = self.clock.now();
        if let Some(next) = trigger.next_fire_time {
            if next + self.config.misfire_threshold < now {
                metrics::counter!("jobstore_triggers_misfired_total").increment(1);
                match self.calculator.apply_misfire(&mut trigger, now)? {
                    None => {
                        info!("触发器 {} 错过触发且没有后续触发时间，标记为完成", trigger.key);
                        trigger.state = TriggerState::Complete;
                        trigger.fire_instance_id = None;
                        self.repos.triggers.save(&trigger).await?;
                        return Ok(Candidate::Skipped);
                    }
                    Some(next) if next > horizon => {
                        debug!("触发器 {} 错过触发，顺延到 {}", trigger.key, next);
                        trigger.state = TriggerState::Waiting;
                        self.repos.triggers.save(&trigger).await?;
                        return Ok(Candidate::Skipped);
                    }
                    Some(_) => {}
                }
            }
        }

        trigger.state = TriggerState::Acquired;
        trigger.fire_instance_id = Some(Uuid::new_v4().to_string());
        self.repos.triggers.save(&trigger).await?;
        debug!(
            "获取触发器 {} 触发时间 {:?} 实例 {:?}",
            trigger.key, trigger.next_fire_time, trigger.fire_instance_id
        );
        Ok(Candidate::Acquired(trigger))
    }

    /// 确认触发；每个触发器的结果相互独立
    pub async fn triggers_fired(&self, triggers: &[TriggerRecord]) -> Vec<TriggerFiredResult> {
        let mut results = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let result = match self.fire(trigger).await {
                Ok(result) => result,
                Err(e) => {
                    error!("确认触发 {} 失败: {}", trigger.key, e);
                    self.abandon(trigger).await;
                    TriggerFiredResult::Failed {
                        key: trigger.key.clone(),
                        message: e.to_string(),
                    }
                }
            };

            match &result {
                TriggerFiredResult::Fired(_) => {
                    metrics::counter!("jobstore_triggers_fired_total").increment(1);
                }
                TriggerFiredResult::Vetoed { key, veto } => {
                    info!("触发器 {} 被否决: {:?}", key, veto);
                    metrics::counter!("jobstore_triggers_vetoed_total").increment(1);
                }
                TriggerFiredResult::Failed { .. } => {}
            }
            results.push(result);
        }
        results
    }

    async fn fire(&self, acquired: &TriggerRecord) -> JobStoreResult<TriggerFiredResult> {
        let key = &acquired.key;
        let vetoed = |veto| TriggerFiredResult::Vetoed {
            key: key.clone(),
            veto,
        };

        let Some(mut trigger) = self.repos.triggers.find(key).await? else {
            self.lock_manager.unlock(LockType::Trigger, key).await?;
            return Ok(vetoed(FireVeto::NoInstance));
        };

        // 锁被接管或触发器被重新获取后，这次触发已不属于本节点
        if trigger.state != TriggerState::Acquired
            || trigger.fire_instance_id != acquired.fire_instance_id
        {
            // 状态仍为 ACQUIRED 说明已被重新获取，锁属于那次获取
            if trigger.state != TriggerState::Acquired
                && self.lock_manager.owns(LockType::Trigger, key).await?
            {
                debug!("触发器 {} 在获取后变为 {}，释放触发器锁", key, trigger.state);
                self.lock_manager.unlock(LockType::Trigger, key).await?;
            }
            return Ok(vetoed(FireVeto::NoInstance));
        }
        if !self.lock_manager.owns(LockType::Trigger, key).await? {
            return Ok(vetoed(FireVeto::NoInstance));
        }

        let Some(job) = self.repos.jobs.find(&trigger.job_key).await? else {
            warn!("触发器 {} 的作业 {} 已被删除", key, trigger.job_key);
            self.repos.triggers.delete(key).await?;
            self.lock_manager.unlock(LockType::Trigger, key).await?;
            return Ok(vetoed(FireVeto::JobDeleted));
        };

        let Some(scheduled) = trigger.next_fire_time else {
            self.repos
                .triggers
                .transfer_state(key, TriggerState::Acquired, TriggerState::Complete)
                .await?;
            self.lock_manager.unlock(LockType::Trigger, key).await?;
            return Ok(vetoed(FireVeto::Misfire));
        };

        if job.concurrent_execution_disallowed {
            if !self.lock_manager.try_lock(LockType::Job, &job.key).await? {
                self.block_on_job_lock(key, &job.key).await?;
                self.lock_manager.unlock(LockType::Trigger, key).await?;
                return Ok(vetoed(FireVeto::Blocked));
            }
        }

        // 持有作业锁之后的任何失败都要释放作业锁并解除兄弟触发器的阻塞
        let previous_fire_time = trigger.previous_fire_time;
        let recovering = trigger.recovering;
        if let Err(e) = self.advance(&mut trigger, &job, scheduled).await {
            if job.concurrent_execution_disallowed {
                self.release_job_lock(&job.key).await;
            }
            return Err(e);
        }
        let now = self.clock.now();

        info!(
            "触发器 {} 触发作业 {} 计划时间 {} 下次 {:?}{}",
            key,
            job.key,
            scheduled,
            trigger.next_fire_time,
            if recovering { " (恢复执行)" } else { "" }
        );

        let next_fire_time = trigger.next_fire_time;
        Ok(TriggerFiredResult::Fired(Box::new(TriggerFiredBundle {
            job,
            trigger,
            recovering,
            fire_time: now,
            scheduled_fire_time: Some(scheduled),
            previous_fire_time,
            next_fire_time,
        })))
    }

    async fn advance(
        &self,
        trigger: &mut TriggerRecord,
        job: &JobRecord,
        scheduled: DateTime<Utc>,
    ) -> JobStoreResult<()> {
        if job.concurrent_execution_disallowed {
            self.state_manager.block_siblings(&job.key, &trigger.key).await?;
        }
        trigger.previous_fire_time = Some(scheduled);
        trigger.next_fire_time = self.calculator.fire_time_after(trigger, scheduled)?;
        trigger.times_triggered += 1;
        trigger.recovering = false;
        self.repos.triggers.save(trigger).await
    }

    /// 作业锁被其他节点持有：ACQUIRED → BLOCKED
    ///
    /// 写入后再检查一次作业锁，持有者若已在此期间释放并完成解除阻塞，则自行恢复为 WAITING。
    async fn block_on_job_lock(&self, key: &TriggerKey, job_key: &JobKey) -> JobStoreResult<()> {
        if !self
            .repos
            .triggers
            .transfer_state(key, TriggerState::Acquired, TriggerState::Blocked)
            .await?
        {
            return Ok(());
        }
        if !self.lock_manager.is_locked_by_other(LockType::Job, job_key).await? {
            debug!("作业 {} 的锁已释放，触发器 {} 恢复等待", job_key, key);
            self.repos
                .triggers
                .transfer_state(key, TriggerState::Blocked, TriggerState::Waiting)
                .await?;
        }
        Ok(())
    }

    /// 确认触发中途失败时释放已获取的作业锁，再解除兄弟触发器的阻塞
    async fn release_job_lock(&self, job_key: &JobKey) {
        if let Err(e) = self.lock_manager.unlock(LockType::Job, job_key).await {
            error!("释放作业锁 {} 失败: {}", job_key, e);
        }
        if let Err(e) = self.state_manager.unblock_siblings(job_key).await {
            error!("解除作业 {} 的触发器阻塞失败: {}", job_key, e);
        }
    }

    /// 确认触发失败时尽力恢复状态并释放锁
    async fn abandon(&self, trigger: &TriggerRecord) {
        if let Err(e) = self
            .repos
            .triggers
            .transfer_state(&trigger.key, TriggerState::Acquired, TriggerState::Waiting)
            .await
        {
            warn!("重置触发器 {} 状态失败: {}", trigger.key, e);
        }
        if let Err(e) = self.lock_manager.unlock(LockType::Trigger, &trigger.key).await {
            error!("释放触发器锁 {} 失败: {}", trigger.key, e);
        }
    }

    /// 放弃已获取但未触发的触发器：ACQUIRED → WAITING 并释放锁
    pub async fn release_acquired_trigger(&self, trigger: &TriggerRecord) -> JobStoreResult<()> {
        let reset = self
            .repos
            .triggers
            .transfer_state(&trigger.key, TriggerState::Acquired, TriggerState::Waiting)
            .await;
        let unlocked = self.lock_manager.unlock(LockType::Trigger, &trigger.key).await;

        if reset? {
            debug!("释放已获取的触发器: {}", trigger.key);
        }
        unlocked
    }
}
