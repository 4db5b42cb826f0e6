use thiserror::Error;

/// 作业存储错误类型定义
///
/// 锁竞争不是错误（以 `bool` 返回），并发删除导致的记录缺失以否决结果返回，
/// 这里只包含需要调用方处理的存储、配置与致命错误。
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("作业未找到: {key}")]
    JobNotFound { key: String },

    #[error("触发器未找到: {key}")]
    TriggerNotFound { key: String },

    #[error("作业已存在: {key}")]
    JobAlreadyExists { key: String },

    #[error("触发器已存在: {key}")]
    TriggerAlreadyExists { key: String },

    #[error("日历已存在: {name}")]
    CalendarAlreadyExists { name: String },

    #[error("日历仍被触发器引用: {name}")]
    CalendarInUse { name: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的调度参数: {0}")]
    InvalidSchedule(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("节点签到失败: {0}")]
    CheckinFailed(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl JobStoreError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }

    pub fn job_not_found<S: Into<String>>(key: S) -> Self {
        Self::JobNotFound { key: key.into() }
    }

    pub fn trigger_not_found<S: Into<String>>(key: S) -> Self {
        Self::TriggerNotFound { key: key.into() }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 瞬时存储故障，可在调用点有限重试
    pub fn is_retryable(&self) -> bool {
        match self {
            JobStoreError::Database(e) => !matches!(
                e,
                sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::TypeNotFound { .. }
            ),
            JobStoreError::DatabaseOperation(_) => true,
            _ => false,
        }
    }

    /// 需要停止节点的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            JobStoreError::Configuration(_) | JobStoreError::CheckinFailed(_)
        )
    }
}

impl From<serde_json::Error> for JobStoreError {
    fn from(err: serde_json::Error) -> Self {
        JobStoreError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type JobStoreResult<T> = std::result::Result<T, JobStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(JobStoreError::database_error("write concern timeout").is_retryable());
        assert!(JobStoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!JobStoreError::Database(sqlx::Error::ColumnNotFound("state".into())).is_retryable());
        assert!(!JobStoreError::job_not_found("g1.job").is_retryable());
        assert!(!JobStoreError::config_error("bad").is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(JobStoreError::CheckinFailed("exhausted".into()).is_fatal());
        assert!(JobStoreError::config_error("missing url").is_fatal());
        assert!(!JobStoreError::database_error("transient").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = JobStoreError::TriggerAlreadyExists {
            key: "g1.t1".to_string(),
        };
        assert_eq!(err.to_string(), "触发器已存在: g1.t1");
    }
}
