//! 配置管理
//!
//! 配置按 默认值 → TOML 文件 → `JOBSTORE_` 环境变量 的顺序叠加，加载后统一验证。
//!
//! ```rust,no_run
//! use jobstore_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/jobstore.toml")).unwrap();
//! println!("cluster: {}", config.job_store.scheduler_name);
//! ```

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests {
    mod app_config_tests;
}
