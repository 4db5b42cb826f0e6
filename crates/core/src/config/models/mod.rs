pub mod app_config;
pub mod database;
pub mod job_store;
pub mod observability;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use job_store::{JobStoreConfig, NodeConfig, AUTO_INSTANCE_ID};
pub use observability::ObservabilityConfig;
