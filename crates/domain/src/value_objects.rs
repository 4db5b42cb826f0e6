use std::fmt;
use std::str::FromStr;

use jobstore_core::JobStoreError;
use serde::{Deserialize, Serialize};

/// 默认分组名
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// 作业或触发器的标识 (group, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub group: String,
    pub name: String,
}

pub type JobKey = Key;
pub type TriggerKey = Key;

impl Key {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    pub fn with_default_group(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_GROUP, name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// 触发器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    Waiting,
    Acquired,
    Paused,
    PausedBlocked,
    Blocked,
    Complete,
    Error,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Waiting => "WAITING",
            TriggerState::Acquired => "ACQUIRED",
            TriggerState::Paused => "PAUSED",
            TriggerState::PausedBlocked => "PAUSED_BLOCKED",
            TriggerState::Blocked => "BLOCKED",
            TriggerState::Complete => "COMPLETE",
            TriggerState::Error => "ERROR",
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, TriggerState::Paused | TriggerState::PausedBlocked)
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerState {
    type Err = JobStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(TriggerState::Waiting),
            "ACQUIRED" => Ok(TriggerState::Acquired),
            "PAUSED" => Ok(TriggerState::Paused),
            "PAUSED_BLOCKED" => Ok(TriggerState::PausedBlocked),
            "BLOCKED" => Ok(TriggerState::Blocked),
            "COMPLETE" => Ok(TriggerState::Complete),
            "ERROR" => Ok(TriggerState::Error),
            _ => Err(JobStoreError::Serialization(format!("无效的触发器状态: {s}"))),
        }
    }
}

/// 锁类型，与分组和名称组成锁的唯一键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    Trigger,
    Job,
}

impl LockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Trigger => "TRIGGER",
            LockType::Job => "JOB",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = JobStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIGGER" => Ok(LockType::Trigger),
            "JOB" => Ok(LockType::Job),
            _ => Err(JobStoreError::Serialization(format!("无效的锁类型: {s}"))),
        }
    }
}

/// 调度规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// 在开始时间触发一次
    OneShot,
    /// 从开始时间起按固定间隔触发，`repeat_count` 为额外触发次数，-1 表示无限
    Interval { interval_ms: i64, repeat_count: i32 },
    /// CRON表达式（含秒字段）
    Cron { expression: String },
}

impl Schedule {
    pub const REPEAT_INDEFINITELY: i32 = -1;

    pub fn interval(interval_ms: i64, repeat_count: i32) -> Self {
        Schedule::Interval {
            interval_ms,
            repeat_count,
        }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
        }
    }

    /// 只会触发一次的调度
    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            Schedule::OneShot
                | Schedule::Interval {
                    repeat_count: 0,
                    ..
                }
        )
    }
}

/// 错过触发的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MisfireInstruction {
    /// 由调度类型决定，当前等同于立即触发
    #[default]
    Smart,
    /// 忽略错过，按原定时间补发
    IgnoreMisfirePolicy,
    /// 立即触发一次
    FireNow,
    /// 跳过错过的触发，等待下一次
    DoNothing,
}

/// 作业执行完成后对触发器的处理指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletedExecutionInstruction {
    Noop,
    ReExecuteJob,
    SetTriggerComplete,
    DeleteTrigger,
    SetTriggerError,
    SetAllJobTriggersComplete,
    SetAllJobTriggersError,
}

/// 暂停分组集合的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PausedGroupKind {
    Job,
    Trigger,
}

impl PausedGroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PausedGroupKind::Job => "JOB",
            PausedGroupKind::Trigger => "TRIGGER",
        }
    }
}

/// 分组匹配条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMatcher {
    Equals(String),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Anything,
}

impl GroupMatcher {
    pub fn group_equals(group: impl Into<String>) -> Self {
        GroupMatcher::Equals(group.into())
    }

    pub fn matches(&self, group: &str) -> bool {
        match self {
            GroupMatcher::Equals(v) => group == v,
            GroupMatcher::StartsWith(v) => group.starts_with(v.as_str()),
            GroupMatcher::EndsWith(v) => group.ends_with(v.as_str()),
            GroupMatcher::Contains(v) => group.contains(v.as_str()),
            GroupMatcher::Anything => true,
        }
    }

    /// 精确匹配时返回分组名
    pub fn exact_group(&self) -> Option<&str> {
        match self {
            GroupMatcher::Equals(v) => Some(v),
            _ => None,
        }
    }
}

/// 触发被否决的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FireVeto {
    /// 触发器不存在或已不属于本节点
    NoInstance,
    /// 作业已被删除
    JobDeleted,
    /// 触发器已没有下一次触发时间
    Misfire,
    /// 不允许并发的作业正在其他节点执行
    Blocked,
}
