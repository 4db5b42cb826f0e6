pub mod manager;
pub mod mapping;
pub mod schema;
pub mod sqlite;

pub use manager::DatabaseManager;
pub use schema::TableNames;
pub use sqlite::{
    SqliteCalendarRepository, SqliteJobRepository, SqliteLockRepository,
    SqlitePausedGroupRepository, SqliteSchedulerRepository, SqliteTriggerRepository,
};
