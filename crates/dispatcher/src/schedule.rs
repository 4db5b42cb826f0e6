//! 调度时间计算
//!
//! 一次性、固定间隔和CRON三种调度，时间均为UTC。

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use jobstore_core::{JobStoreError, JobStoreResult};
use jobstore_domain::{MisfireInstruction, Schedule, ScheduleCalculator, TriggerRecord};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScheduleCalculator;

impl DefaultScheduleCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 验证调度参数
    pub fn validate(schedule: &Schedule) -> JobStoreResult<()> {
        match schedule {
            Schedule::OneShot => Ok(()),
            Schedule::Interval {
                interval_ms,
                repeat_count,
            } => {
                if *interval_ms <= 0 {
                    return Err(JobStoreError::InvalidSchedule(format!(
                        "重复间隔必须大于0: {interval_ms}"
                    )));
                }
                if *repeat_count < Schedule::REPEAT_INDEFINITELY {
                    return Err(JobStoreError::InvalidSchedule(format!(
                        "无效的重复次数: {repeat_count}"
                    )));
                }
                Ok(())
            }
            Schedule::Cron { expression } => parse_cron(expression).map(|_| ()),
        }
    }

    fn within_end(trigger: &TriggerRecord, time: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        time.filter(|t| trigger.end_time.is_none_or(|end| *t <= end))
    }
}

fn parse_cron(expression: &str) -> JobStoreResult<cron::Schedule> {
    cron::Schedule::from_str(expression).map_err(|e| JobStoreError::InvalidCron {
        expr: expression.to_string(),
        message: e.to_string(),
    })
}

impl ScheduleCalculator for DefaultScheduleCalculator {
    fn first_fire_time(&self, trigger: &TriggerRecord) -> JobStoreResult<Option<DateTime<Utc>>> {
        Self::validate(&trigger.schedule)?;
        let first = match &trigger.schedule {
            Schedule::OneShot | Schedule::Interval { .. } => Some(trigger.start_time),
            Schedule::Cron { expression } => parse_cron(expression)?
                .after(&(trigger.start_time - Duration::milliseconds(1)))
                .next(),
        };
        Ok(Self::within_end(trigger, first))
    }

    fn fire_time_after(
        &self,
        trigger: &TriggerRecord,
        after: DateTime<Utc>,
    ) -> JobStoreResult<Option<DateTime<Utc>>> {
        let next = match &trigger.schedule {
            Schedule::OneShot => (trigger.start_time > after).then_some(trigger.start_time),
            Schedule::Interval {
                interval_ms,
                repeat_count,
            } => {
                if *interval_ms <= 0 {
                    return Err(JobStoreError::InvalidSchedule(format!(
                        "重复间隔必须大于0: {interval_ms}"
                    )));
                }
                if after < trigger.start_time {
                    Some(trigger.start_time)
                } else {
                    let elapsed = (after - trigger.start_time).num_milliseconds();
                    let index = elapsed / interval_ms + 1;
                    if *repeat_count >= 0 && index > i64::from(*repeat_count) {
                        None
                    } else {
                        Some(trigger.start_time + Duration::milliseconds(index * interval_ms))
                    }
                }
            }
            Schedule::Cron { expression } => {
                let from = after.max(trigger.start_time - Duration::milliseconds(1));
                parse_cron(expression)?.after(&from).next()
            }
        };
        Ok(Self::within_end(trigger, next))
    }

    fn apply_misfire(
        &self,
        trigger: &mut TriggerRecord,
        now: DateTime<Utc>,
    ) -> JobStoreResult<Option<DateTime<Utc>>> {
        let instruction = match (trigger.misfire_instruction, &trigger.schedule) {
            (MisfireInstruction::Smart, Schedule::Interval { repeat_count, .. })
                if *repeat_count != 0 =>
            {
                MisfireInstruction::DoNothing
            }
            (MisfireInstruction::Smart, _) => MisfireInstruction::FireNow,
            (instruction, _) => instruction,
        };

        let next = match instruction {
            MisfireInstruction::IgnoreMisfirePolicy => trigger.next_fire_time,
            MisfireInstruction::DoNothing => self.fire_time_after(trigger, now)?,
            MisfireInstruction::FireNow | MisfireInstruction::Smart => Some(now),
        };

        debug!(
            "触发器 {} 错过触发，策略 {:?}: {:?} → {:?}",
            trigger.key, instruction, trigger.next_fire_time, next
        );
        trigger.next_fire_time = next;
        Ok(next)
    }
}
