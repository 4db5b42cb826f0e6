//! 行与记录之间的转换工具
//!
//! 时间统一以毫秒整数存储，记录正文以 JSON 文档存储，索引列单独保存。

use chrono::{DateTime, Utc};
use jobstore_core::{JobStoreError, JobStoreResult};
use serde::{de::DeserializeOwned, Serialize};

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn to_millis(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    pub fn from_millis(millis: i64) -> JobStoreResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| JobStoreError::Serialization(format!("无效的时间戳: {millis}")))
    }

    pub fn to_document<T: Serialize>(record: &T) -> JobStoreResult<String> {
        serde_json::to_string(record)
            .map_err(|e| JobStoreError::Serialization(format!("序列化记录失败: {e}")))
    }

    pub fn from_document<T: DeserializeOwned>(document: &str) -> JobStoreResult<T> {
        serde_json::from_str(document)
            .map_err(|e| JobStoreError::Serialization(format!("解析记录失败: {e}")))
    }
}
