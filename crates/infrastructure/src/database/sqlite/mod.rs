pub mod sqlite_calendar_repository;
pub mod sqlite_job_repository;
pub mod sqlite_lock_repository;
pub mod sqlite_paused_group_repository;
pub mod sqlite_scheduler_repository;
pub mod sqlite_trigger_repository;

pub use sqlite_calendar_repository::SqliteCalendarRepository;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_lock_repository::SqliteLockRepository;
pub use sqlite_paused_group_repository::SqlitePausedGroupRepository;
pub use sqlite_scheduler_repository::SqliteSchedulerRepository;
pub use sqlite_trigger_repository::SqliteTriggerRepository;
