//! 指标导出
//!
//! 各组件直接使用 `metrics` 宏记录，这里负责注册描述并安装 Prometheus 导出器。

use std::net::SocketAddr;

use anyhow::{Context, Result};
use jobstore_core::config::ObservabilityConfig;
use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 作业存储记录的全部计数器
pub const METRIC_NAMES: [&str; 8] = [
    "jobstore_locks_acquired_total",
    "jobstore_locks_stolen_total",
    "jobstore_triggers_acquired_total",
    "jobstore_triggers_fired_total",
    "jobstore_triggers_vetoed_total",
    "jobstore_triggers_misfired_total",
    "jobstore_triggers_recovered_total",
    "jobstore_checkin_failures_total",
];

pub fn describe_metrics() {
    describe_counter!("jobstore_locks_acquired_total", Unit::Count, "新建锁记录的次数");
    describe_counter!("jobstore_locks_stolen_total", Unit::Count, "接管过期或失效节点锁的次数");
    describe_counter!("jobstore_triggers_acquired_total", Unit::Count, "获取的触发器数量");
    describe_counter!("jobstore_triggers_fired_total", Unit::Count, "确认触发的触发器数量");
    describe_counter!("jobstore_triggers_vetoed_total", Unit::Count, "被否决的触发数量");
    describe_counter!("jobstore_triggers_misfired_total", Unit::Count, "错过触发的次数");
    describe_counter!("jobstore_triggers_recovered_total", Unit::Count, "恢复执行的触发器数量");
    describe_counter!("jobstore_checkin_failures_total", Unit::Count, "签到失败次数");
}

/// 安装 Prometheus 导出器，需要在 tokio 运行时内调用
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .metrics_bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {}", config.metrics_bind_address))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus导出器失败")?;
    describe_metrics();

    info!("Prometheus指标导出已启动: {}", addr);
    Ok(())
}
