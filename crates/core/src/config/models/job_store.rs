use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// 自动生成实例ID的占位值
pub const AUTO_INSTANCE_ID: &str = "AUTO";

/// 作业存储与集群协调配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStoreConfig {
    /// 集群（调度器）名称，同名节点共享同一组成员记录
    pub scheduler_name: String,
    /// 节点实例ID，`AUTO` 表示由主机名和启动时间生成
    pub instance_id: String,
    pub clustered: bool,
    pub checkin_interval_ms: u64,
    pub checkin_max_retries: u32,
    pub checkin_retry_delay_ms: u64,
    pub misfire_threshold_ms: u64,
    /// 触发器锁超时，必须大于最慢的一次触发周期
    pub trigger_timeout_ms: u64,
    /// 不允许并发作业的作业锁超时
    pub job_timeout_ms: u64,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            scheduler_name: "jobstore-cluster".to_string(),
            instance_id: AUTO_INSTANCE_ID.to_string(),
            clustered: true,
            checkin_interval_ms: 7_500,
            checkin_max_retries: 10,
            checkin_retry_delay_ms: 1_000,
            misfire_threshold_ms: 5_000,
            trigger_timeout_ms: 10 * 60 * 1_000,
            job_timeout_ms: 10 * 60 * 1_000,
        }
    }
}

impl JobStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler_name.is_empty() {
            return Err(anyhow::anyhow!("调度器名称不能为空"));
        }

        if self.instance_id.is_empty() {
            return Err(anyhow::anyhow!("实例ID不能为空"));
        }

        if self.checkin_interval_ms == 0 {
            return Err(anyhow::anyhow!("签到间隔必须大于0"));
        }

        if self.trigger_timeout_ms <= self.checkin_interval_ms {
            return Err(anyhow::anyhow!(
                "触发器锁超时({}ms)必须大于签到间隔({}ms)",
                self.trigger_timeout_ms,
                self.checkin_interval_ms
            ));
        }

        if self.job_timeout_ms <= self.checkin_interval_ms {
            return Err(anyhow::anyhow!(
                "作业锁超时({}ms)必须大于签到间隔({}ms)",
                self.job_timeout_ms,
                self.checkin_interval_ms
            ));
        }

        Ok(())
    }

    /// 解析实例ID，`AUTO` 时生成 `主机名 + 毫秒时间戳`
    pub fn resolve_instance_id(&mut self) -> &str {
        if self.instance_id == AUTO_INSTANCE_ID {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            self.instance_id = format!("{host}{millis}");
        }
        &self.instance_id
    }

    pub fn checkin_interval(&self) -> Duration {
        Duration::milliseconds(self.checkin_interval_ms as i64)
    }

    pub fn misfire_threshold(&self) -> Duration {
        Duration::milliseconds(self.misfire_threshold_ms as i64)
    }

    pub fn trigger_timeout(&self) -> Duration {
        Duration::milliseconds(self.trigger_timeout_ms as i64)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::milliseconds(self.job_timeout_ms as i64)
    }
}

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 空闲时两次获取之间的等待
    pub idle_wait_ms: u64,
    /// 每轮最多获取的触发器数量
    pub batch_size: usize,
    pub batch_time_window_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 1_000,
            batch_size: 1,
            batch_time_window_ms: 0,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_wait_ms == 0 {
            return Err(anyhow::anyhow!("空闲等待时间必须大于0"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("批量获取数量必须大于0"));
        }

        Ok(())
    }
}
