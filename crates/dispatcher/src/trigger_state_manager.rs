//! 触发器状态机
//!
//! 状态: WAITING, ACQUIRED, PAUSED, PAUSED_BLOCKED, BLOCKED, COMPLETE, ERROR。
//! 暂停/恢复在多个节点间并发时以最后写入为准。

use std::collections::BTreeSet;
use std::sync::Arc;

use jobstore_core::JobStoreResult;
use jobstore_domain::{
    repositories::{JobRepository, PausedGroupRepository, TriggerRepository},
    GroupMatcher, JobKey, PausedGroupKind, TriggerKey, TriggerRecord, TriggerState,
};
use tracing::{debug, info};

pub struct TriggerStateManager {
    triggers: Arc<dyn TriggerRepository>,
    jobs: Arc<dyn JobRepository>,
    paused_groups: Arc<dyn PausedGroupRepository>,
}

impl TriggerStateManager {
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        jobs: Arc<dyn JobRepository>,
        paused_groups: Arc<dyn PausedGroupRepository>,
    ) -> Self {
        Self {
            triggers,
            jobs,
            paused_groups,
        }
    }

    /// WAITING/ACQUIRED → PAUSED，BLOCKED → PAUSED_BLOCKED，其余状态不变
    pub async fn pause(&self, key: &TriggerKey) -> JobStoreResult<()> {
        let Some(state) = self.triggers.get_state(key).await? else {
            return Ok(());
        };

        let target = match state {
            TriggerState::Waiting | TriggerState::Acquired => TriggerState::Paused,
            TriggerState::Blocked => TriggerState::PausedBlocked,
            _ => return Ok(()),
        };

        if self.triggers.transfer_state(key, state, target).await? {
            debug!("暂停触发器: {} {} → {}", key, state, target);
        }
        Ok(())
    }

    /// PAUSED → WAITING，PAUSED_BLOCKED → BLOCKED；所在分组被暂停时不恢复
    pub async fn resume(&self, key: &TriggerKey) -> JobStoreResult<()> {
        let Some(trigger) = self.triggers.find(key).await? else {
            return Ok(());
        };

        let target = match trigger.state {
            TriggerState::Paused => TriggerState::Waiting,
            TriggerState::PausedBlocked => TriggerState::Blocked,
            _ => return Ok(()),
        };

        if self.is_group_paused(&trigger).await? {
            debug!("触发器 {} 所在分组已暂停，忽略恢复", key);
            return Ok(());
        }

        if self.triggers.transfer_state(key, trigger.state, target).await? {
            debug!("恢复触发器: {} {} → {}", key, trigger.state, target);
        }
        Ok(())
    }

    pub async fn pause_job(&self, job_key: &JobKey) -> JobStoreResult<()> {
        for trigger in self.triggers.find_by_job(job_key).await? {
            self.pause(&trigger.key).await?;
        }
        Ok(())
    }

    pub async fn resume_job(&self, job_key: &JobKey) -> JobStoreResult<()> {
        for trigger in self.triggers.find_by_job(job_key).await? {
            self.resume(&trigger.key).await?;
        }
        Ok(())
    }

    /// 暂停匹配的触发器分组，返回被暂停的分组名
    ///
    /// 精确匹配的分组即使当前没有触发器也会被记录，之后存入的触发器直接处于暂停状态。
    pub async fn pause_triggers(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        let triggers = self.triggers.find_all().await?;
        let mut groups: BTreeSet<String> = triggers
            .iter()
            .filter(|t| matcher.matches(&t.key.group))
            .map(|t| t.key.group.clone())
            .collect();
        if let Some(group) = matcher.exact_group() {
            groups.insert(group.to_string());
        }

        for group in &groups {
            self.paused_groups.add(PausedGroupKind::Trigger, group).await?;
        }
        for trigger in triggers.iter().filter(|t| groups.contains(&t.key.group)) {
            self.pause(&trigger.key).await?;
        }

        info!("暂停触发器分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    /// 恢复匹配的触发器分组，返回被恢复的分组名
    pub async fn resume_triggers(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        let mut groups: BTreeSet<String> = self
            .paused_groups
            .list(PausedGroupKind::Trigger)
            .await?
            .into_iter()
            .filter(|g| matcher.matches(g))
            .collect();
        for group in &groups {
            self.paused_groups.remove(PausedGroupKind::Trigger, group).await?;
        }

        let triggers = self.triggers.find_all().await?;
        for trigger in triggers.iter().filter(|t| matcher.matches(&t.key.group)) {
            groups.insert(trigger.key.group.clone());
            self.resume(&trigger.key).await?;
        }

        info!("恢复触发器分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    /// 暂停匹配的作业分组下所有作业的触发器，返回被暂停的分组名
    pub async fn pause_jobs(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        let jobs = self.jobs.find_all().await?;
        let mut groups: BTreeSet<String> = jobs
            .iter()
            .filter(|j| matcher.matches(&j.key.group))
            .map(|j| j.key.group.clone())
            .collect();
        if let Some(group) = matcher.exact_group() {
            groups.insert(group.to_string());
        }

        for group in &groups {
            self.paused_groups.add(PausedGroupKind::Job, group).await?;
        }
        for job in jobs.iter().filter(|j| groups.contains(&j.key.group)) {
            self.pause_job(&job.key).await?;
        }

        info!("暂停作业分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    /// 恢复匹配的作业分组，返回被恢复的分组名
    pub async fn resume_jobs(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        let mut groups: BTreeSet<String> = self
            .paused_groups
            .list(PausedGroupKind::Job)
            .await?
            .into_iter()
            .filter(|g| matcher.matches(g))
            .collect();
        for group in &groups {
            self.paused_groups.remove(PausedGroupKind::Job, group).await?;
        }

        let jobs = self.jobs.find_all().await?;
        for job in jobs.iter().filter(|j| matcher.matches(&j.key.group)) {
            groups.insert(job.key.group.clone());
            self.resume_job(&job.key).await?;
        }

        info!("恢复作业分组: {:?}", groups);
        Ok(groups.into_iter().collect())
    }

    pub async fn pause_all(&self) -> JobStoreResult<()> {
        self.pause_triggers(&GroupMatcher::Anything).await?;
        Ok(())
    }

    /// 清空两个暂停分组集合并恢复所有触发器
    pub async fn resume_all(&self) -> JobStoreResult<()> {
        self.paused_groups.clear(PausedGroupKind::Trigger).await?;
        self.paused_groups.clear(PausedGroupKind::Job).await?;
        for trigger in self.triggers.find_all().await? {
            self.resume(&trigger.key).await?;
        }
        info!("恢复全部触发器");
        Ok(())
    }

    /// 仅处理 ERROR 状态：分组暂停时转为 PAUSED，否则转为 WAITING。
    /// 其他状态不产生任何写入。
    pub async fn reset_trigger_from_error_state(&self, key: &TriggerKey) -> JobStoreResult<()> {
        if self.triggers.get_state(key).await? != Some(TriggerState::Error) {
            return Ok(());
        }

        let target = if self
            .paused_groups
            .contains(PausedGroupKind::Trigger, &key.group)
            .await?
        {
            TriggerState::Paused
        } else {
            TriggerState::Waiting
        };

        if self
            .triggers
            .transfer_state(key, TriggerState::Error, target)
            .await?
        {
            info!("触发器 {} 从错误状态恢复为 {}", key, target);
        }
        Ok(())
    }

    /// 有效状态：存储状态叠加当前的分组暂停
    pub async fn get_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>> {
        let Some(trigger) = self.triggers.find(key).await? else {
            return Ok(None);
        };

        let paused = self.is_group_paused(&trigger).await?;
        let effective = match trigger.state {
            TriggerState::Waiting | TriggerState::Acquired if paused => TriggerState::Paused,
            TriggerState::Blocked if paused => TriggerState::PausedBlocked,
            state => state,
        };
        Ok(Some(effective))
    }

    /// 触发器分组或其作业分组是否被暂停
    pub async fn is_group_paused(&self, trigger: &TriggerRecord) -> JobStoreResult<bool> {
        Ok(self
            .paused_groups
            .contains(PausedGroupKind::Trigger, &trigger.key.group)
            .await?
            || self
                .paused_groups
                .contains(PausedGroupKind::Job, &trigger.job_key.group)
                .await?)
    }

    /// 作业锁被持有期间，同一作业的其他触发器进入阻塞状态
    pub async fn block_siblings(&self, job_key: &JobKey, except: &TriggerKey) -> JobStoreResult<()> {
        for trigger in self.triggers.find_by_job(job_key).await? {
            if &trigger.key == except {
                continue;
            }
            match trigger.state {
                TriggerState::Waiting => {
                    self.triggers
                        .transfer_state(&trigger.key, TriggerState::Waiting, TriggerState::Blocked)
                        .await?;
                }
                TriggerState::Paused => {
                    self.triggers
                        .transfer_state(
                            &trigger.key,
                            TriggerState::Paused,
                            TriggerState::PausedBlocked,
                        )
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// 作业锁释放后解除阻塞
    pub async fn unblock_siblings(&self, job_key: &JobKey) -> JobStoreResult<()> {
        for trigger in self.triggers.find_by_job(job_key).await? {
            match trigger.state {
                TriggerState::Blocked => {
                    self.triggers
                        .transfer_state(&trigger.key, TriggerState::Blocked, TriggerState::Waiting)
                        .await?;
                }
                TriggerState::PausedBlocked => {
                    self.triggers
                        .transfer_state(
                            &trigger.key,
                            TriggerState::PausedBlocked,
                            TriggerState::Paused,
                        )
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
