//! 作业存储门面
//!
//! 组合锁管理、触发器获取、状态机与集群成员，对调度器暴露完整的作业存储接口。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use jobstore_core::{config::JobStoreConfig, Clock, JobStoreResult, SystemClock};
use jobstore_domain::{
    CalendarRecord, CompletedExecutionInstruction, GroupMatcher, JobKey, JobRecord, Repositories,
    ScheduleCalculator, TriggerFiredResult, TriggerKey, TriggerRecord, TriggerState,
};
use tokio::sync::broadcast;
use tracing::info;

use crate::cluster::{
    CheckinConfig, CheckinErrorHandler, CheckinExecutor, CheckinTask, RecoveryReport,
    ShutdownOnCheckinFailure, TriggerRecoverer,
};
use crate::expiry::ExpiryCalculator;
use crate::job_complete::JobCompleteHandler;
use crate::lock_manager::LockManager;
use crate::persister::TriggerPersister;
use crate::schedule::DefaultScheduleCalculator;
use crate::trigger_runner::{TriggerRunner, TriggerRunnerConfig};
use crate::trigger_state_manager::TriggerStateManager;

pub struct JobStoreBuilder {
    repos: Repositories,
    config: JobStoreConfig,
    clock: Option<Arc<dyn Clock>>,
    calculator: Option<Arc<dyn ScheduleCalculator>>,
    checkin_error_handler: Option<Arc<dyn CheckinErrorHandler>>,
}

impl JobStoreBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn ScheduleCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    /// 签到重试耗尽时的处理，默认停止节点
    pub fn with_checkin_error_handler(mut self, handler: Arc<dyn CheckinErrorHandler>) -> Self {
        self.checkin_error_handler = Some(handler);
        self
    }

    pub fn build(self) -> JobStore {
        let mut config = self.config;
        config.resolve_instance_id();

        let repos = self.repos;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let calculator = self
            .calculator
            .unwrap_or_else(|| Arc::new(DefaultScheduleCalculator::new()));
        let (shutdown_tx, _) = broadcast::channel(16);
        let error_handler = self
            .checkin_error_handler
            .unwrap_or_else(|| Arc::new(ShutdownOnCheckinFailure::new(shutdown_tx.clone())));

        let lock_manager = Arc::new(LockManager::new(
            Arc::clone(&repos.locks),
            ExpiryCalculator::from_config(&config),
            Arc::clone(&clock),
            config.instance_id.clone(),
        ));
        let state_manager = Arc::new(TriggerStateManager::new(
            Arc::clone(&repos.triggers),
            Arc::clone(&repos.jobs),
            Arc::clone(&repos.paused_groups),
        ));
        let persister = Arc::new(TriggerPersister::new(
            repos.clone(),
            Arc::clone(&state_manager),
            Arc::clone(&lock_manager),
            Arc::clone(&calculator),
        ));
        let runner = TriggerRunner::new(
            repos.clone(),
            Arc::clone(&lock_manager),
            Arc::clone(&state_manager),
            Arc::clone(&calculator),
            Arc::clone(&clock),
            Some(TriggerRunnerConfig {
                misfire_threshold: config.misfire_threshold(),
                ..Default::default()
            }),
        );
        let completer = JobCompleteHandler::new(
            repos.clone(),
            Arc::clone(&lock_manager),
            Arc::clone(&state_manager),
            Arc::clone(&persister),
        );
        let recoverer = TriggerRecoverer::new(
            repos.clone(),
            Arc::clone(&lock_manager),
            Arc::clone(&state_manager),
            Arc::clone(&persister),
            Arc::clone(&clock),
            config.scheduler_name.clone(),
        );
        let checkin_task = Arc::new(CheckinTask::new(
            Arc::clone(&repos.schedulers),
            Arc::clone(&clock),
            CheckinConfig::from_config(&config),
            error_handler,
        ));
        let checkin = CheckinExecutor::new(
            Arc::clone(&checkin_task),
            StdDuration::from_millis(config.checkin_interval_ms),
        );

        JobStore {
            config,
            clock,
            lock_manager,
            state_manager,
            persister,
            runner,
            completer,
            recoverer,
            checkin_task,
            checkin,
            shutdown_tx,
        }
    }
}

pub struct JobStore {
    config: JobStoreConfig,
    clock: Arc<dyn Clock>,
    lock_manager: Arc<LockManager>,
    state_manager: Arc<TriggerStateManager>,
    persister: Arc<TriggerPersister>,
    runner: TriggerRunner,
    completer: JobCompleteHandler,
    recoverer: TriggerRecoverer,
    checkin_task: Arc<CheckinTask>,
    checkin: CheckinExecutor,
    shutdown_tx: broadcast::Sender<()>,
}

impl JobStore {
    pub fn builder(repos: Repositories, config: JobStoreConfig) -> JobStoreBuilder {
        JobStoreBuilder {
            repos,
            config,
            clock: None,
            calculator: None,
            checkin_error_handler: None,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    pub fn config(&self) -> &JobStoreConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// 集群模式下先恢复失效节点，再签到并启动周期签到
    pub async fn initialize(&self) -> JobStoreResult<Option<RecoveryReport>> {
        if !self.config.clustered {
            info!("非集群模式，跳过恢复与签到");
            return Ok(None);
        }

        info!(
            "节点 {} 加入集群 {}",
            self.config.instance_id, self.config.scheduler_name
        );
        let report = self.recoverer.recover().await?;
        self.checkin_task.run().await?;
        self.checkin.start().await;
        Ok(Some(report))
    }

    /// 恢复失效节点遗留的锁与触发器
    pub async fn recover(&self) -> JobStoreResult<RecoveryReport> {
        self.recoverer.recover().await
    }

    /// 单次签到（含重试）
    pub async fn check_in(&self) -> JobStoreResult<()> {
        self.checkin_task.run().await
    }

    /// 停止签到；持有的锁保留，由过期或其他节点的恢复处理
    pub async fn shutdown(&self) {
        self.checkin.stop().await;
        info!("作业存储已关闭: {}", self.config.instance_id);
    }

    /// 签到失败等致命错误触发的关闭信号
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn is_checkin_running(&self) -> bool {
        self.checkin.is_running().await
    }

    // 调度热路径

    pub async fn acquire_next_triggers(
        &self,
        no_later_than: DateTime<Utc>,
        max_count: usize,
        time_window: Duration,
    ) -> JobStoreResult<Vec<TriggerRecord>> {
        self.runner
            .acquire_next(no_later_than, max_count, time_window)
            .await
    }

    pub async fn release_acquired_trigger(&self, trigger: &TriggerRecord) -> JobStoreResult<()> {
        self.runner.release_acquired_trigger(trigger).await
    }

    pub async fn triggers_fired(&self, triggers: &[TriggerRecord]) -> Vec<TriggerFiredResult> {
        self.runner.triggers_fired(triggers).await
    }

    pub async fn triggered_job_complete(
        &self,
        trigger: &TriggerRecord,
        job: &JobRecord,
        instruction: CompletedExecutionInstruction,
    ) -> JobStoreResult<()> {
        self.completer
            .triggered_job_complete(trigger, job, instruction)
            .await
    }

    // 存取

    pub async fn store_job(&self, job: &JobRecord, replace_existing: bool) -> JobStoreResult<()> {
        self.persister.store_job(job, replace_existing).await
    }

    pub async fn store_trigger(
        &self,
        trigger: &TriggerRecord,
        replace_existing: bool,
    ) -> JobStoreResult<()> {
        self.persister.store_trigger(trigger, replace_existing).await
    }

    pub async fn store_job_and_trigger(
        &self,
        job: &JobRecord,
        trigger: &TriggerRecord,
    ) -> JobStoreResult<()> {
        self.persister.store_job_and_trigger(job, trigger).await
    }

    pub async fn store_jobs_and_triggers(
        &self,
        jobs: &[(JobRecord, Vec<TriggerRecord>)],
        replace_existing: bool,
    ) -> JobStoreResult<()> {
        self.persister
            .store_jobs_and_triggers(jobs, replace_existing)
            .await
    }

    pub async fn remove_job(&self, key: &JobKey) -> JobStoreResult<bool> {
        self.persister.remove_job(key).await
    }

    pub async fn remove_jobs(&self, keys: &[JobKey]) -> JobStoreResult<bool> {
        self.persister.remove_jobs(keys).await
    }

    pub async fn remove_trigger(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        self.persister.remove_trigger(key).await
    }

    pub async fn remove_triggers(&self, keys: &[TriggerKey]) -> JobStoreResult<bool> {
        self.persister.remove_triggers(keys).await
    }

    pub async fn replace_trigger(
        &self,
        key: &TriggerKey,
        new_trigger: &TriggerRecord,
    ) -> JobStoreResult<bool> {
        self.persister.replace_trigger(key, new_trigger).await
    }

    pub async fn retrieve_job(&self, key: &JobKey) -> JobStoreResult<Option<JobRecord>> {
        self.persister.retrieve_job(key).await
    }

    pub async fn retrieve_trigger(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>> {
        self.persister.retrieve_trigger(key).await
    }

    pub async fn check_job_exists(&self, key: &JobKey) -> JobStoreResult<bool> {
        self.persister.check_job_exists(key).await
    }

    pub async fn check_trigger_exists(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        self.persister.check_trigger_exists(key).await
    }

    pub async fn get_triggers_for_job(&self, key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>> {
        self.persister.get_triggers_for_job(key).await
    }

    pub async fn get_number_of_jobs(&self) -> JobStoreResult<usize> {
        self.persister.get_number_of_jobs().await
    }

    pub async fn get_number_of_triggers(&self) -> JobStoreResult<usize> {
        self.persister.get_number_of_triggers().await
    }

    pub async fn get_number_of_calendars(&self) -> JobStoreResult<usize> {
        self.persister.get_number_of_calendars().await
    }

    pub async fn get_job_group_names(&self) -> JobStoreResult<Vec<String>> {
        self.persister.get_job_group_names().await
    }

    pub async fn get_trigger_group_names(&self) -> JobStoreResult<Vec<String>> {
        self.persister.get_trigger_group_names().await
    }

    pub async fn get_job_keys(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<JobKey>> {
        self.persister.get_job_keys(matcher).await
    }

    pub async fn get_trigger_keys(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<TriggerKey>> {
        self.persister.get_trigger_keys(matcher).await
    }

    pub async fn store_calendar(
        &self,
        name: &str,
        data: serde_json::Value,
        replace_existing: bool,
    ) -> JobStoreResult<()> {
        self.persister
            .store_calendar(name, data, replace_existing)
            .await
    }

    pub async fn retrieve_calendar(&self, name: &str) -> JobStoreResult<Option<CalendarRecord>> {
        self.persister.retrieve_calendar(name).await
    }

    pub async fn remove_calendar(&self, name: &str) -> JobStoreResult<bool> {
        self.persister.remove_calendar(name).await
    }

    pub async fn get_calendar_names(&self) -> JobStoreResult<Vec<String>> {
        self.persister.get_calendar_names().await
    }

    pub async fn clear_all_scheduling_data(&self) -> JobStoreResult<()> {
        self.persister.clear_all_scheduling_data().await
    }

    // 状态

    pub async fn get_trigger_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>> {
        self.state_manager.get_state(key).await
    }

    pub async fn reset_trigger_from_error_state(&self, key: &TriggerKey) -> JobStoreResult<()> {
        self.state_manager.reset_trigger_from_error_state(key).await
    }

    pub async fn pause_trigger(&self, key: &TriggerKey) -> JobStoreResult<()> {
        self.state_manager.pause(key).await
    }

    pub async fn resume_trigger(&self, key: &TriggerKey) -> JobStoreResult<()> {
        self.state_manager.resume(key).await
    }

    pub async fn pause_job(&self, key: &JobKey) -> JobStoreResult<()> {
        self.state_manager.pause_job(key).await
    }

    pub async fn resume_job(&self, key: &JobKey) -> JobStoreResult<()> {
        self.state_manager.resume_job(key).await
    }

    pub async fn pause_triggers(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        self.state_manager.pause_triggers(matcher).await
    }

    pub async fn resume_triggers(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        self.state_manager.resume_triggers(matcher).await
    }

    pub async fn pause_jobs(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        self.state_manager.pause_jobs(matcher).await
    }

    pub async fn resume_jobs(&self, matcher: &GroupMatcher) -> JobStoreResult<Vec<String>> {
        self.state_manager.resume_jobs(matcher).await
    }

    pub async fn pause_all(&self) -> JobStoreResult<()> {
        self.state_manager.pause_all().await
    }

    pub async fn resume_all(&self) -> JobStoreResult<()> {
        self.state_manager.resume_all().await
    }

    pub async fn get_paused_trigger_groups(&self) -> JobStoreResult<Vec<String>> {
        self.persister.get_paused_trigger_groups().await
    }

    pub async fn get_paused_job_groups(&self) -> JobStoreResult<Vec<String>> {
        self.persister.get_paused_job_groups().await
    }
}
