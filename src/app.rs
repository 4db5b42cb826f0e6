use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jobstore_core::AppConfig;
use jobstore_dispatcher::{JobExecutionContext, JobExecutor, JobStore, SchedulerNode};
use jobstore_domain::CompletedExecutionInstruction;
use jobstore_infrastructure::DatabaseManager;
use tokio::sync::broadcast;
use tracing::info;

/// 默认执行器：只记录被触发的作业
///
/// 嵌入方通过 `SchedulerNode::new` 注入自己的执行器。
pub struct LoggingJobExecutor;

#[async_trait]
impl JobExecutor for LoggingJobExecutor {
    async fn execute(&self, context: &JobExecutionContext) -> CompletedExecutionInstruction {
        info!(
            job = %context.job.key,
            trigger = %context.trigger.key,
            job_type = %context.job.job_type,
            recovering = context.recovering,
            "执行作业"
        );
        CompletedExecutionInstruction::Noop
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    store: Arc<JobStore>,
    node: SchedulerNode,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化作业存储节点");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;

        let store = Arc::new(
            JobStore::builder(database.repositories(), config.job_store.clone()).build(),
        );
        let node = SchedulerNode::new(
            Arc::clone(&store),
            Arc::new(LoggingJobExecutor),
            Some(config.node.clone()),
        );

        Ok(Self {
            config,
            database,
            store,
            node,
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// 恢复失效节点、开始签到，然后运行调度循环直到关闭
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动节点 {}，集群: {}，集群模式: {}",
            self.store.instance_id(),
            self.config.job_store.scheduler_name,
            self.config.job_store.clustered
        );

        if let Some(report) = self.store.initialize().await.context("初始化作业存储失败")? {
            if !report.is_empty() {
                info!(
                    "启动恢复完成: 恢复 {} 个，重新排队 {} 个，移除 {} 个触发器",
                    report.recovered_triggers, report.requeued_triggers, report.removed_triggers
                );
            }
        }

        let result = self.node.run(shutdown_rx).await;
        self.shutdown().await;
        result.context("调度循环异常退出")
    }

    /// 停止签到并关闭连接池
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
        self.database.close().await;
        info!("节点 {} 已关闭", self.store.instance_id());
    }
}
