//! 锁与节点心跳的过期判断
//!
//! 过期是严格大于：持有时间恰好等于超时仍视为有效。

use chrono::{DateTime, Duration, Utc};
use jobstore_core::config::JobStoreConfig;
use jobstore_domain::{LockRecord, LockType, SchedulerRecord};

#[derive(Debug, Clone, Copy)]
pub struct ExpiryCalculator {
    trigger_timeout: Duration,
    job_timeout: Duration,
}

impl ExpiryCalculator {
    pub fn new(trigger_timeout: Duration, job_timeout: Duration) -> Self {
        Self {
            trigger_timeout,
            job_timeout,
        }
    }

    pub fn from_config(config: &JobStoreConfig) -> Self {
        Self::new(config.trigger_timeout(), config.job_timeout())
    }

    /// `now - locked_at > timeout`
    pub fn is_expired(lock: &LockRecord, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - lock.locked_at > timeout
    }

    /// 按锁类型选择触发器锁超时或作业锁超时
    pub fn is_lock_expired(&self, lock: &LockRecord, now: DateTime<Utc>) -> bool {
        Self::is_expired(lock, now, self.timeout_for(lock.lock_type))
    }

    pub fn is_trigger_lock_expired(&self, lock: &LockRecord, now: DateTime<Utc>) -> bool {
        Self::is_expired(lock, now, self.trigger_timeout)
    }

    pub fn is_job_lock_expired(&self, lock: &LockRecord, now: DateTime<Utc>) -> bool {
        Self::is_expired(lock, now, self.job_timeout)
    }

    /// 上次签到加签到间隔早于当前时间即判定节点失效
    pub fn is_scheduler_dead(&self, record: &SchedulerRecord, now: DateTime<Utc>) -> bool {
        record.last_checkin + Duration::milliseconds(record.checkin_interval_ms) < now
    }

    pub fn timeout_for(&self, lock_type: LockType) -> Duration {
        match lock_type {
            LockType::Trigger => self.trigger_timeout,
            LockType::Job => self.job_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobstore_domain::Key;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_462_820_481_910 + millis).unwrap()
    }

    fn lock(lock_type: LockType) -> LockRecord {
        LockRecord::new(lock_type, Key::new("g", "n"), "node-a", at(0))
    }

    #[test]
    fn test_lock_expiry_boundary_is_exclusive() {
        let timeout = Duration::milliseconds(1000);
        let lock = lock(LockType::Trigger);

        assert!(!ExpiryCalculator::is_expired(&lock, at(999), timeout));
        assert!(!ExpiryCalculator::is_expired(&lock, at(1000), timeout));
        assert!(ExpiryCalculator::is_expired(&lock, at(1001), timeout));
    }

    #[test]
    fn test_timeout_selected_by_lock_type() {
        let expiry = ExpiryCalculator::new(Duration::milliseconds(100), Duration::milliseconds(500));

        assert!(expiry.is_lock_expired(&lock(LockType::Trigger), at(101)));
        assert!(!expiry.is_lock_expired(&lock(LockType::Job), at(101)));
        assert!(expiry.is_lock_expired(&lock(LockType::Job), at(501)));
        assert!(expiry.is_trigger_lock_expired(&lock(LockType::Job), at(101)));
        assert!(!expiry.is_job_lock_expired(&lock(LockType::Trigger), at(101)));
    }

    #[test]
    fn test_scheduler_dead_after_missed_checkin_interval() {
        let expiry = ExpiryCalculator::from_config(&JobStoreConfig::default());
        let record = SchedulerRecord {
            scheduler_name: "cluster".into(),
            instance_id: "node-a".into(),
            last_checkin: at(0),
            checkin_interval_ms: 7_500,
        };

        assert!(!expiry.is_scheduler_dead(&record, at(7_500)));
        assert!(expiry.is_scheduler_dead(&record, at(7_501)));
    }
}
