use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use jobstore_core::{init_logging, AppConfig};
use jobstore_infrastructure::init_metrics;
use tokio::signal;
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("jobstore")
        .version("1.0.0")
        .about("集群作业存储节点")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次查找默认位置"),
        )
        .arg(
            Arg::new("instance-id")
                .long("instance-id")
                .value_name("ID")
                .help("节点实例ID，AUTO表示自动生成"),
        )
        .arg(
            Arg::new("standalone")
                .long("standalone")
                .help("关闭集群模式：不签到，不恢复其他节点")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);

    // 加载配置，命令行参数覆盖配置文件与环境变量
    let mut config = AppConfig::load(config_path).context("加载配置失败")?;
    if let Some(id) = matches.get_one::<String>("instance-id") {
        config.job_store.instance_id = id.clone();
    }
    if matches.get_flag("standalone") {
        config.job_store.clustered = false;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    init_metrics(&config.observability)?;

    info!("启动集群作业存储节点");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let app = Arc::new(Application::new(config).await?);

    // 签到失败时作业存储会通过同一通道发出关闭信号
    let shutdown_manager = ShutdownManager::from_sender(app.store().shutdown_sender());
    let mut internal_shutdown = shutdown_manager.subscribe().await;

    let mut app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("节点运行失败: {e:#}");
            }
        })
    };

    let finished_early = tokio::select! {
        _ = wait_for_shutdown_signal() => false,
        _ = internal_shutdown.recv() => {
            warn!("节点内部请求关闭");
            false
        }
        _ = &mut app_handle => true,
    };

    if finished_early {
        info!("节点已退出");
        return Ok(());
    }

    info!("开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("节点已优雅关闭"),
        Ok(Err(e)) => error!("节点关闭时发生错误: {e}"),
        Err(_) => {
            warn!("节点关闭超时，强制退出");
            app.shutdown().await;
        }
    }

    info!("集群作业存储节点已退出");
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
