use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    FireVeto, JobKey, Key, LockType, MisfireInstruction, Schedule, TriggerKey, TriggerState,
};

/// 默认触发器优先级
pub const DEFAULT_PRIORITY: i32 = 5;

/// 作业记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub key: JobKey,
    pub description: Option<String>,
    /// 执行器据此选择作业实现
    pub job_type: String,
    /// 没有触发器时是否保留
    pub durable: bool,
    /// 节点崩溃后是否需要恢复执行
    pub requests_recovery: bool,
    /// 同一作业不允许同时执行
    pub concurrent_execution_disallowed: bool,
    pub data: serde_json::Value,
}

impl JobRecord {
    pub fn new(key: JobKey, job_type: impl Into<String>) -> Self {
        Self {
            key,
            description: None,
            job_type: job_type.into(),
            durable: false,
            requests_recovery: false,
            concurrent_execution_disallowed: false,
            data: serde_json::Value::Null,
        }
    }
}

/// 触发器记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub description: Option<String>,
    pub calendar_name: Option<String>,
    pub schedule: Schedule,
    pub state: TriggerState,
    pub priority: i32,
    pub misfire_instruction: MisfireInstruction,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub times_triggered: i64,
    /// 获取时生成，用于关联一次触发
    pub fire_instance_id: Option<String>,
    /// 下一次触发是崩溃恢复后的重新执行
    pub recovering: bool,
    pub data: serde_json::Value,
}

impl TriggerRecord {
    pub fn new(key: TriggerKey, job_key: JobKey, schedule: Schedule, start_time: DateTime<Utc>) -> Self {
        Self {
            key,
            job_key,
            description: None,
            calendar_name: None,
            schedule,
            state: TriggerState::Waiting,
            priority: DEFAULT_PRIORITY,
            misfire_instruction: MisfireInstruction::default(),
            start_time,
            end_time: None,
            next_fire_time: None,
            previous_fire_time: None,
            times_triggered: 0,
            fire_instance_id: None,
            recovering: false,
            data: serde_json::Value::Null,
        }
    }
}

/// 锁记录，记录存在即表示锁被持有
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_type: LockType,
    pub key: Key,
    pub instance_id: String,
    pub locked_at: DateTime<Utc>,
}

impl LockRecord {
    /// 时间截断到毫秒，存储往返后仍可用于比较删除
    pub fn new(lock_type: LockType, key: Key, instance_id: impl Into<String>, locked_at: DateTime<Utc>) -> Self {
        Self {
            lock_type,
            key,
            instance_id: instance_id.into(),
            locked_at: truncate_millis(locked_at),
        }
    }
}

/// 集群成员记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerRecord {
    pub scheduler_name: String,
    pub instance_id: String,
    pub last_checkin: DateTime<Utc>,
    pub checkin_interval_ms: i64,
}

/// 日历记录，内容对存储不透明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub name: String,
    pub data: serde_json::Value,
}

/// 一次成功触发交给执行方的全部信息
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerFiredBundle {
    pub job: JobRecord,
    pub trigger: TriggerRecord,
    pub recovering: bool,
    pub fire_time: DateTime<Utc>,
    pub scheduled_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
}

/// 单个触发器的触发结果，彼此独立
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerFiredResult {
    Fired(Box<TriggerFiredBundle>),
    Vetoed { key: TriggerKey, veto: FireVeto },
    Failed { key: TriggerKey, message: String },
}

impl TriggerFiredResult {
    pub fn key(&self) -> &TriggerKey {
        match self {
            TriggerFiredResult::Fired(bundle) => &bundle.trigger.key,
            TriggerFiredResult::Vetoed { key, .. } | TriggerFiredResult::Failed { key, .. } => key,
        }
    }

    pub fn bundle(&self) -> Option<&TriggerFiredBundle> {
        match self {
            TriggerFiredResult::Fired(bundle) => Some(&**bundle),
            _ => None,
        }
    }

    pub fn veto(&self) -> Option<FireVeto> {
        match self {
            TriggerFiredResult::Vetoed { veto, .. } => Some(*veto),
            _ => None,
        }
    }
}

pub fn truncate_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}
