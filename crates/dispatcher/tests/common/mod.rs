#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use jobstore_core::{config::JobStoreConfig, Clock, ManualClock};
use jobstore_dispatcher::{ExpiryCalculator, JobStore, LockManager};
use jobstore_domain::Repositories;

pub const TRIGGER_TIMEOUT_MS: u64 = 60_000;
pub const JOB_TIMEOUT_MS: u64 = 60_000;
pub const CHECKIN_INTERVAL_MS: u64 = 7_500;

pub fn store_config(instance_id: &str) -> JobStoreConfig {
    JobStoreConfig {
        scheduler_name: "test-cluster".to_string(),
        instance_id: instance_id.to_string(),
        checkin_interval_ms: CHECKIN_INTERVAL_MS,
        checkin_max_retries: 3,
        checkin_retry_delay_ms: 1,
        trigger_timeout_ms: TRIGGER_TIMEOUT_MS,
        job_timeout_ms: JOB_TIMEOUT_MS,
        ..JobStoreConfig::default()
    }
}

/// 共享存储与时钟的一个模拟节点
pub fn node(repos: &Repositories, clock: &Arc<ManualClock>, instance_id: &str) -> JobStore {
    JobStore::builder(repos.clone(), store_config(instance_id))
        .with_clock(clock.clone() as Arc<dyn Clock>)
        .build()
}

pub fn lock_manager(repos: &Repositories, clock: &Arc<ManualClock>, instance_id: &str) -> LockManager {
    LockManager::new(
        Arc::clone(&repos.locks),
        expiry(),
        clock.clone() as Arc<dyn Clock>,
        instance_id,
    )
}

pub fn expiry() -> ExpiryCalculator {
    ExpiryCalculator::new(
        Duration::milliseconds(TRIGGER_TIMEOUT_MS as i64),
        Duration::milliseconds(JOB_TIMEOUT_MS as i64),
    )
}

pub fn trigger_timeout() -> Duration {
    Duration::milliseconds(TRIGGER_TIMEOUT_MS as i64)
}
