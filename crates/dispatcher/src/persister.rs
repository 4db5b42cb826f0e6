//! 作业、触发器与日历的存取
//!
//! 非持久作业在最后一个触发器被删除时一并删除。

use std::collections::BTreeSet;
use std::sync::Arc;

use jobstore_core::{JobStoreError, JobStoreResult};
use jobstore_domain::{
    CalendarRecord, GroupMatcher, JobKey, JobRecord, LockType, PausedGroupKind, Repositories,
    ScheduleCalculator, TriggerKey, TriggerRecord, TriggerState,
};
use tracing::{debug, info};

use crate::lock_manager::LockManager;
use crate::trigger_state_manager::TriggerStateManager;

pub struct TriggerPersister {
    repos: Repositories,
    state_manager: Arc<TriggerStateManager>,
    lock_manager: Arc<LockManager>,
    calculator: Arc<dyn ScheduleCalculator>,
}

impl TriggerPersister {
    pub fn new(
        repos: Repositories,
        state_manager: Arc<TriggerStateManager>,
        lock_manager: Arc<LockManager>,
        calculator: Arc<dyn ScheduleCalculator>,
    ) -> Self {
        Self {
            repos,
            state_manager,
            lock_manager,
            calculator,
        }
    }

    pub async fn store_job(&self, job: &JobRecord, replace_existing: bool) -> JobStoreResult<()> {
        if replace_existing {
            self.repos.jobs.save(job).await?;
        } else if !self.repos.jobs.insert(job).await? {
            return Err(JobStoreError::JobAlreadyExists {
                key: job.key.to_string(),
            });
        }
        debug!("存储作业: {}", job.key);
        Ok(())
    }

    /// 存储触发器，初始状态由分组暂停和作业锁决定
    pub async fn store_trigger(
        &self,
        trigger: &TriggerRecord,
        replace_existing: bool,
    ) -> JobStoreResult<()> {
        let Some(job) = self.repos.jobs.find(&trigger.job_key).await? else {
            return Err(JobStoreError::job_not_found(trigger.job_key.to_string()));
        };

        let mut trigger = trigger.clone();
        if trigger.next_fire_time.is_none() {
            trigger.next_fire_time = self.calculator.first_fire_time(&trigger)?;
            if trigger.next_fire_time.is_none() {
                return Err(JobStoreError::InvalidSchedule(format!(
                    "触发器 {} 永远不会触发",
                    trigger.key
                )));
            }
        }
        trigger.state = self.initial_state(&trigger, &job).await?;
        trigger.fire_instance_id = None;

        if replace_existing {
            self.repos.triggers.save(&trigger).await?;
        } else if !self.repos.triggers.insert(&trigger).await? {
            return Err(JobStoreError::TriggerAlreadyExists {
                key: trigger.key.to_string(),
            });
        }

        debug!(
            "存储触发器: {} 作业: {} 状态: {} 下次触发: {:?}",
            trigger.key, trigger.job_key, trigger.state, trigger.next_fire_time
        );
        Ok(())
    }

    pub async fn store_job_and_trigger(
        &self,
        job: &JobRecord,
        trigger: &TriggerRecord,
    ) -> JobStoreResult<()> {
        self.store_job(job, false).await?;
        self.store_trigger(trigger, false).await
    }

    pub async fn store_jobs_and_triggers(
        &self,
        entries: &[(JobRecord, Vec<TriggerRecord>)],
        replace: bool,
    ) -> JobStoreResult<()> {
        for (job, triggers) in entries {
            self.store_job(job, replace).await?;
            for trigger in triggers {
                self.store_trigger(trigger, replace).await?;
            }
        }
        Ok(())
    }

    /// 删除作业及其全部触发器
    pub async fn remove_job(&self, key: &JobKey) -> JobStoreResult<bool> {
        for trigger in self.repos.triggers.find_by_job(key).await? {
            self.repos.triggers.delete(&trigger.key).await?;
        }
        let removed = self.repos.jobs.delete(key).await?;
        if removed {
            info!("删除作业: {}", key);
        }
        Ok(removed)
    }

    pub async fn remove_jobs(&self, keys: &[JobKey]) -> JobStoreResult<bool> {
        let mut all_removed = true;
        for key in keys {
            all_removed &= self.remove_job(key).await?;
        }
        Ok(all_removed)
    }

    /// 删除触发器；非持久作业失去最后一个触发器时一并删除
    pub async fn remove_trigger(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        let Some(trigger) = self.repos.triggers.find(key).await? else {
            return Ok(false);
        };
        if !self.repos.triggers.delete(key).await? {
            return Ok(false);
        }
        debug!("删除触发器: {}", key);
        self.remove_orphaned_job(&trigger.job_key).await?;
        Ok(true)
    }

    pub async fn remove_triggers(&self, keys: &[TriggerKey]) -> JobStoreResult<bool> {
        let mut all_removed = true;
        for key in keys {
            all_removed &= self.remove_trigger(key).await?;
        }
        Ok(all_removed)
    }

    /// 用新触发器替换旧触发器，两者必须属于同一作业
    pub async fn replace_trigger(
        &self,
        key: &TriggerKey,
        new_trigger: &TriggerRecord,
    ) -> JobStoreResult<bool> {
        let Some(old) = self.repos.triggers.find(key).await? else {
            return Ok(false);
        };
        if old.job_key != new_trigger.job_key {
            return Err(JobStoreError::InvalidSchedule(format!(
                "新触发器 {} 必须与原触发器属于同一作业 {}",
                new_trigger.key, old.job_key
            )));
        }

        self.repos.triggers.delete(key).await?;
        self.store_trigger(new_trigger, true).await?;
        Ok(true)
    }

    /// 作业非持久且没有剩余触发器时删除
    pub async fn remove_orphaned_job(&self, job_key: &JobKey) -> JobStoreResult<bool> {
        let Some(job) = self.repos.jobs.find(job_key).await? else {
            return Ok(false);
        };
        if job.durable || !self.repos.triggers.find_by_job(job_key).await?.is_empty() {
            return Ok(false);
        }
        let removed = self.repos.jobs.delete(job_key).await?;
        if removed {
            info!("作业 {} 已没有触发器，随之删除", job_key);
        }
        Ok(removed)
    }

    pub async fn retrieve_job(&self, key: &JobKey) -> JobStoreResult<Option<JobRecord>> {
        self.repos.jobs.find(key).await
    }

    pub async fn retrieve_trigger(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>> {
        self.repos.triggers.find(key).await
    }

    pub async fn check_job_exists(&self, key: &JobKey) -> JobStoreResult<bool> {
        Ok(self.repos.jobs.find(key).await?.is_some())
    }

    pub async fn check_trigger_exists(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        Ok(self.repos.triggers.find(key).await?.is_some())
    }

    pub async fn get_triggers_for_job(&self, key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>> {
        self.repos.triggers.find_by_job(key).await
    }

    pub async fn get_number_of_jobs(&self) -> JobStoreResult<usize> {
        self.repos.jobs.count().await
    }

    pub async fn get_number_of_triggers(&self) -> JobStoreResult<usize> {
        self.repos.triggers.count().await
    }

    pub async fn get_number_of_calendars(&self) -> JobStoreResult<usize> {
        self.repos.calendars.count().await
    }

    pub async fn get_job_group_names(&self) -> JobStoreResult<Vec<String>> {
        let groups: BTreeSet<String> = self
            .repos
            .jobs
            .find_all()
            .await?
            .into_iter()
            .map(|j| j.key.group)
            .collect();
        Ok(groups.into_iter().collect())
    }

    pub async fn get_trigger_group_names(&self) -> JobStoreResult<Vec<String>> {
        let groups: BTreeSet<String> = self
            .repos
            .triggers
            .find_all()
            .await?
            .into_iter()
            .map(|t| t.key.group)
            .collect();
        Ok(groups.into_iter().collect())
    }

    pub async fn get_job_keys(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<JobKey>> {
        Ok(self
            .repos
            .jobs
            .find_all()
            .await?
            .into_iter()
            .filter(|j| matcher.matches(&j.key.group))
            .map(|j| j.key)
            .collect())
    }

    pub async fn get_trigger_keys(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<TriggerKey>> {
        Ok(self
            .repos
            .triggers
            .find_all()
            .await?
            .into_iter()
            .filter(|t| matcher.matches(&t.key.group))
            .map(|t| t.key)
            .collect())
    }

    pub async fn get_paused_trigger_groups(&self) -> JobStoreResult<Vec<String>> {
        let groups: BTreeSet<String> = self
            .repos
            .paused_groups
            .list(PausedGroupKind::Trigger)
            .await?
            .into_iter()
            .collect();
        Ok(groups.into_iter().collect())
    }

    pub async fn get_paused_job_groups(&self) -> JobStoreResult<Vec<String>> {
        let groups: BTreeSet<String> = self
            .repos
            .paused_groups
            .list(PausedGroupKind::Job)
            .await?
            .into_iter()
            .collect();
        Ok(groups.into_iter().collect())
    }

    pub async fn store_calendar(
        &self,
        name: &str,
        data: serde_json::Value,
        replace_existing: bool,
    ) -> JobStoreResult<()> {
        let calendar = CalendarRecord {
            name: name.to_string(),
            data,
        };
        if replace_existing {
            self.repos.calendars.save(&calendar).await?;
        } else if !self.repos.calendars.insert(&calendar).await? {
            return Err(JobStoreError::CalendarAlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub async fn retrieve_calendar(&self, name: &str) -> JobStoreResult<Option<CalendarRecord>> {
        self.repos.calendars.find(name).await
    }

    /// 仍被触发器引用的日历不能删除
    pub async fn remove_calendar(&self, name: &str) -> JobStoreResult<bool> {
        let referenced = self
            .repos
            .triggers
            .find_all()
            .await?
            .iter()
            .any(|t| t.calendar_name.as_deref() == Some(name));
        if referenced {
            return Err(JobStoreError::CalendarInUse {
                name: name.to_string(),
            });
        }
        self.repos.calendars.delete(name).await
    }

    pub async fn get_calendar_names(&self) -> JobStoreResult<Vec<String>> {
        self.repos.calendars.names().await
    }

    /// 清空作业、触发器、日历与暂停分组；锁与集群成员记录保留
    pub async fn clear_all_scheduling_data(&self) -> JobStoreResult<()> {
        self.repos.triggers.clear().await?;
        self.repos.jobs.clear().await?;
        self.repos.calendars.clear().await?;
        self.repos.paused_groups.clear(PausedGroupKind::Trigger).await?;
        self.repos.paused_groups.clear(PausedGroupKind::Job).await?;
        info!("已清空全部调度数据");
        Ok(())
    }

    async fn initial_state(
        &self,
        trigger: &TriggerRecord,
        job: &JobRecord,
    ) -> JobStoreResult<TriggerState> {
        let paused = self.state_manager.is_group_paused(trigger).await?;
        let blocked = job.concurrent_execution_disallowed
            && self
                .lock_manager
                .find_lock(LockType::Job, &job.key)
                .await?
                .is_some();

        Ok(match (paused, blocked) {
            (true, true) => TriggerState::PausedBlocked,
            (true, false) => TriggerState::Paused,
            (false, true) => TriggerState::Blocked,
            (false, false) => TriggerState::Waiting,
        })
    }
}
