//! 节点签到
//!
//! 写入失败按线性退避重试，耗尽后交给错误处理器。无法证明存活的节点不能继续持有
//! 其他节点认为已过期的锁，默认处理是停止节点。

use std::sync::Arc;
use std::time::Duration;

use jobstore_core::{config::JobStoreConfig, Clock, JobStoreError, JobStoreResult};
use jobstore_domain::{repositories::SchedulerRepository, SchedulerRecord};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 签到耗尽重试后的处理
pub trait CheckinErrorHandler: Send + Sync {
    fn handle(&self, error: &JobStoreError);
}

/// 发送节点关闭信号
pub struct ShutdownOnCheckinFailure {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownOnCheckinFailure {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }
}

impl CheckinErrorHandler for ShutdownOnCheckinFailure {
    fn handle(&self, error: &JobStoreError) {
        error!("节点无法完成签到，停止节点: {}", error);
        let _ = self.shutdown_tx.send(());
    }
}

#[derive(Debug, Clone)]
pub struct CheckinConfig {
    pub scheduler_name: String,
    pub instance_id: String,
    pub checkin_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl CheckinConfig {
    pub fn from_config(config: &JobStoreConfig) -> Self {
        Self {
            scheduler_name: config.scheduler_name.clone(),
            instance_id: config.instance_id.clone(),
            checkin_interval: Duration::from_millis(config.checkin_interval_ms),
            max_retries: config.checkin_max_retries,
            retry_delay: Duration::from_millis(config.checkin_retry_delay_ms),
        }
    }
}

pub struct CheckinTask {
    schedulers: Arc<dyn SchedulerRepository>,
    clock: Arc<dyn Clock>,
    config: CheckinConfig,
    error_handler: Arc<dyn CheckinErrorHandler>,
}

impl CheckinTask {
    pub fn new(
        schedulers: Arc<dyn SchedulerRepository>,
        clock: Arc<dyn Clock>,
        config: CheckinConfig,
        error_handler: Arc<dyn CheckinErrorHandler>,
    ) -> Self {
        Self {
            schedulers,
            clock,
            config,
            error_handler,
        }
    }

    /// 写入一次成员记录
    pub async fn check_in(&self) -> JobStoreResult<()> {
        let record = SchedulerRecord {
            scheduler_name: self.config.scheduler_name.clone(),
            instance_id: self.config.instance_id.clone(),
            last_checkin: self.clock.now(),
            checkin_interval_ms: self.config.checkin_interval.as_millis() as i64,
        };
        self.schedulers.check_in(&record).await?;
        debug!("节点 {} 签到", self.config.instance_id);
        Ok(())
    }

    /// 签到并在可重试错误上按 `retry_delay * 次数` 退避，失败时调用错误处理器
    pub async fn run(&self) -> JobStoreResult<()> {
        let mut retry_count = 0;
        loop {
            match self.check_in().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && retry_count < self.config.max_retries => {
                    retry_count += 1;
                    metrics::counter!("jobstore_checkin_failures_total").increment(1);
                    warn!(
                        "节点 {} 签到失败，第 {} 次重试: {}",
                        self.config.instance_id, retry_count, e
                    );
                    tokio::time::sleep(self.config.retry_delay * retry_count).await;
                }
                Err(e) => {
                    metrics::counter!("jobstore_checkin_failures_total").increment(1);
                    let failure = JobStoreError::CheckinFailed(format!(
                        "节点 {} 重试 {} 次后签到仍失败: {}",
                        self.config.instance_id, retry_count, e
                    ));
                    self.error_handler.handle(&failure);
                    return Err(failure);
                }
            }
        }
    }
}

/// 周期签到
pub struct CheckinExecutor {
    task: Arc<CheckinTask>,
    interval: Duration,
    stop_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CheckinExecutor {
    pub fn new(task: Arc<CheckinTask>, interval: Duration) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            task,
            interval,
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    /// 启动后台签到，首次签到立即执行
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }

        let task = Arc::clone(&self.task);
        let interval = self.interval;
        let mut stop_rx = self.stop_tx.subscribe();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if task.run().await.is_err() {
                            break;
                        }
                    }
                    _ = stop_rx.recv() => {
                        debug!("签到任务收到停止信号");
                        break;
                    }
                }
            }
        }));
        info!("签到任务已启动，间隔 {:?}", interval);
    }

    /// 停止签到，持有的锁不做处理
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("签到任务退出异常: {}", e);
            }
            info!("签到任务已停止");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
