pub mod cluster;
pub mod expiry;
pub mod job_complete;
pub mod job_store;
pub mod lock_manager;
pub mod node;
pub mod persister;
pub mod schedule;
pub mod trigger_runner;
pub mod trigger_state_manager;

pub use cluster::{
    CheckinConfig, CheckinErrorHandler, CheckinExecutor, CheckinTask, RecoveryReport,
    ShutdownOnCheckinFailure, TriggerRecoverer,
};
pub use expiry::ExpiryCalculator;
pub use job_complete::JobCompleteHandler;
pub use job_store::{JobStore, JobStoreBuilder};
pub use lock_manager::LockManager;
pub use node::{JobExecutionContext, JobExecutor, SchedulerNode};
pub use persister::TriggerPersister;
pub use schedule::DefaultScheduleCalculator;
pub use trigger_runner::{TriggerRunner, TriggerRunnerConfig};
pub use trigger_state_manager::TriggerStateManager;
