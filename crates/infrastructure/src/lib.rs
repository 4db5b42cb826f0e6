//! 存储适配层：SQLite 与内存两种仓储实现，以及指标导出

pub mod database;
pub mod memory;
pub mod observability;

pub use database::*;
pub use memory::*;
pub use observability::{describe_metrics, init_metrics};
