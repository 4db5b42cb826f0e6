//! 集群成员：心跳签到与失效节点恢复

pub mod checkin;
pub mod recovery;

pub use checkin::{
    CheckinConfig, CheckinErrorHandler, CheckinExecutor, CheckinTask, ShutdownOnCheckinFailure,
};
pub use recovery::{RecoveryReport, TriggerRecoverer};
