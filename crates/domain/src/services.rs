//! 调度计算端口
//!
//! 核心只需要"下一次触发时间"和"错过触发处理"两个黑盒计算，由外部注入。

use chrono::{DateTime, Utc};
use jobstore_core::JobStoreResult;

use crate::entities::TriggerRecord;

pub trait ScheduleCalculator: Send + Sync {
    /// 新存储的触发器的首次触发时间
    fn first_fire_time(&self, trigger: &TriggerRecord) -> JobStoreResult<Option<DateTime<Utc>>>;

    /// 严格晚于 `after` 的下一次触发时间，调度耗尽时返回 None
    fn fire_time_after(
        &self,
        trigger: &TriggerRecord,
        after: DateTime<Utc>,
    ) -> JobStoreResult<Option<DateTime<Utc>>>;

    /// 按触发器的错过策略改写 `next_fire_time`，返回新的值
    fn apply_misfire(
        &self,
        trigger: &mut TriggerRecord,
        now: DateTime<Utc>,
    ) -> JobStoreResult<Option<DateTime<Utc>>>;
}
