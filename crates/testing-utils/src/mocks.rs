//! Fault-injecting repository wrappers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jobstore_core::{JobStoreError, JobStoreResult};
use jobstore_domain::{entities::SchedulerRecord, repositories::SchedulerRepository};

/// Fails the first `failures` check-ins with a retryable error, then delegates
pub struct FlakySchedulerRepository {
    inner: Arc<dyn SchedulerRepository>,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakySchedulerRepository {
    pub fn new(inner: Arc<dyn SchedulerRepository>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Never succeeds
    pub fn always_failing(inner: Arc<dyn SchedulerRepository>) -> Self {
        Self::new(inner, usize::MAX)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulerRepository for FlakySchedulerRepository {
    async fn check_in(&self, record: &SchedulerRecord) -> JobStoreResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failures.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(JobStoreError::database_error("write concern timeout"));
        }
        self.inner.check_in(record).await
    }

    async fn find_all(&self, scheduler_name: &str) -> JobStoreResult<Vec<SchedulerRecord>> {
        self.inner.find_all(scheduler_name).await
    }

    async fn remove(&self, scheduler_name: &str, instance_id: &str) -> JobStoreResult<bool> {
        self.inner.remove(scheduler_name, instance_id).await
    }
}
