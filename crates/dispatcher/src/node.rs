//! 调度节点主循环
//!
//! 获取到期触发器 → 确认触发 → 执行作业 → 完成回写。作业执行器由嵌入方提供。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jobstore_core::{config::NodeConfig, JobStoreResult};
use jobstore_domain::{
    CompletedExecutionInstruction, JobRecord, TriggerFiredBundle, TriggerFiredResult,
    TriggerRecord,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::job_store::JobStore;

/// 同一次触发内要求重新执行的上限
pub const MAX_REEXECUTIONS: u32 = 3;

/// 一次作业执行的上下文
#[derive(Debug, Clone)]
pub struct JobExecutionContext {
    pub job: JobRecord,
    pub trigger: TriggerRecord,
    pub fire_time: DateTime<Utc>,
    pub scheduled_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    /// 失效节点恢复后的重新执行
    pub recovering: bool,
    pub fire_instance_id: Option<String>,
    pub refire_count: u32,
}

impl JobExecutionContext {
    pub fn from_bundle(bundle: &TriggerFiredBundle) -> Self {
        Self {
            job: bundle.job.clone(),
            trigger: bundle.trigger.clone(),
            fire_time: bundle.fire_time,
            scheduled_fire_time: bundle.scheduled_fire_time,
            previous_fire_time: bundle.previous_fire_time,
            next_fire_time: bundle.next_fire_time,
            recovering: bundle.recovering,
            fire_instance_id: bundle.trigger.fire_instance_id.clone(),
            refire_count: 0,
        }
    }
}

/// 作业执行器
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, context: &JobExecutionContext) -> CompletedExecutionInstruction;
}

pub struct SchedulerNode {
    store: Arc<JobStore>,
    executor: Arc<dyn JobExecutor>,
    config: NodeConfig,
}

impl SchedulerNode {
    pub fn new(store: Arc<JobStore>, executor: Arc<dyn JobExecutor>, config: Option<NodeConfig>) -> Self {
        Self {
            store,
            executor,
            config: config.unwrap_or_default(),
        }
    }

    /// 运行调度循环直到收到关闭信号，退出前等待执行中的作业完成
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JobStoreResult<()> {
        info!("调度节点 {} 启动", self.store.instance_id());
        let idle_wait = StdDuration::from_millis(self.config.idle_wait_ms);
        let mut executions = JoinSet::new();

        let result = loop {
            while let Some(joined) = executions.try_join_next() {
                if let Err(e) = joined {
                    error!("作业执行任务异常退出: {}", e);
                }
            }

            let fired = match self.acquire_and_fire().await {
                Ok(bundles) => bundles,
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => {
                    error!("获取触发器失败: {}", e);
                    Vec::new()
                }
            };

            if fired.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(idle_wait) => {}
                    _ = shutdown_rx.recv() => {
                        info!("调度节点收到关闭信号");
                        break Ok(());
                    }
                }
                continue;
            }

            for bundle in fired {
                let store = Arc::clone(&self.store);
                let executor = Arc::clone(&self.executor);
                executions.spawn(async move { execute(store, executor, bundle).await });
            }

            match shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!("调度节点收到关闭信号");
                    break Ok(());
                }
                Err(_) => {}
            }
        };

        if !executions.is_empty() {
            info!("等待 {} 个执行中的作业完成", executions.len());
        }
        while let Some(joined) = executions.join_next().await {
            if let Err(e) = joined {
                error!("作业执行任务异常退出: {}", e);
            }
        }
        info!("调度节点 {} 已停止", self.store.instance_id());
        result
    }

    /// 执行一轮调度并等待本轮作业完成，返回触发的作业数
    pub async fn run_once(&self) -> JobStoreResult<usize> {
        let fired = self.acquire_and_fire().await?;
        let count = fired.len();
        let mut executions = JoinSet::new();
        for bundle in fired {
            let store = Arc::clone(&self.store);
            let executor = Arc::clone(&self.executor);
            executions.spawn(async move { execute(store, executor, bundle).await });
        }
        while let Some(joined) = executions.join_next().await {
            if let Err(e) = joined {
                error!("作业执行任务异常退出: {}", e);
            }
        }
        Ok(count)
    }

    async fn acquire_and_fire(&self) -> JobStoreResult<Vec<TriggerFiredBundle>> {
        let now = self.store.clock().now();
        let acquired = self
            .store
            .acquire_next_triggers(
                now,
                self.config.batch_size,
                Duration::milliseconds(self.config.batch_time_window_ms as i64),
            )
            .await?;
        if acquired.is_empty() {
            return Ok(Vec::new());
        }

        let mut bundles = Vec::with_capacity(acquired.len());
        for result in self.store.triggers_fired(&acquired).await {
            match result {
                TriggerFiredResult::Fired(bundle) => bundles.push(*bundle),
                TriggerFiredResult::Vetoed { key, veto } => {
                    debug!("触发器 {} 本轮不执行: {:?}", key, veto);
                }
                TriggerFiredResult::Failed { key, message } => {
                    warn!("触发器 {} 确认触发失败: {}", key, message);
                }
            }
        }
        Ok(bundles)
    }
}

async fn execute(store: Arc<JobStore>, executor: Arc<dyn JobExecutor>, bundle: TriggerFiredBundle) {
    let mut context = JobExecutionContext::from_bundle(&bundle);
    let mut instruction = executor.execute(&context).await;
    while instruction == CompletedExecutionInstruction::ReExecuteJob
        && context.refire_count < MAX_REEXECUTIONS
    {
        context.refire_count += 1;
        debug!("作业 {} 请求重新执行，第 {} 次", bundle.job.key, context.refire_count);
        instruction = executor.execute(&context).await;
    }

    if let Err(e) = store
        .triggered_job_complete(&bundle.trigger, &bundle.job, instruction)
        .await
    {
        error!("回写作业 {} 完成状态失败: {}", bundle.job.key, e);
    }
}
