//! 作业存储的基础设施层：配置、错误类型、日志与时钟抽象

pub mod clock;
pub mod config;
pub mod errors;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use errors::{JobStoreError, JobStoreResult};
pub use logging::{init_logging, init_test_logging};
