//! Test data builders for job and trigger records

use chrono::{DateTime, Duration, Utc};
use jobstore_domain::{
    JobKey, JobRecord, MisfireInstruction, Schedule, TriggerKey, TriggerRecord, TriggerState,
};

use crate::helpers::fixed_time;

/// Builder for creating test job records
pub struct JobBuilder {
    job: JobRecord,
}

impl JobBuilder {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            job: JobRecord::new(JobKey::new(group, name), "test_job"),
        }
    }

    pub fn with_job_type(mut self, job_type: &str) -> Self {
        self.job.job_type = job_type.to_string();
        self
    }

    pub fn durable(mut self) -> Self {
        self.job.durable = true;
        self
    }

    pub fn requests_recovery(mut self) -> Self {
        self.job.requests_recovery = true;
        self
    }

    pub fn non_concurrent(mut self) -> Self {
        self.job.concurrent_execution_disallowed = true;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.job.data = data;
        self
    }

    pub fn build(self) -> JobRecord {
        self.job
    }
}

/// Builder for creating test trigger records
///
/// Defaults to a one-shot trigger due at [`fixed_time`].
pub struct TriggerBuilder {
    trigger: TriggerRecord,
}

impl TriggerBuilder {
    pub fn new(group: &str, name: &str, job_key: &JobKey) -> Self {
        let mut trigger = TriggerRecord::new(
            TriggerKey::new(group, name),
            job_key.clone(),
            Schedule::OneShot,
            fixed_time(),
        );
        trigger.next_fire_time = Some(fixed_time());
        Self { trigger }
    }

    pub fn for_job(name: &str, job: &JobRecord) -> Self {
        Self::new(&job.key.group, name, &job.key)
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.trigger.schedule = schedule;
        self
    }

    pub fn repeating(self, interval_ms: i64) -> Self {
        self.with_schedule(Schedule::interval(interval_ms, Schedule::REPEAT_INDEFINITELY))
    }

    /// Sets both the start time and the next fire time
    pub fn starting_at(mut self, time: DateTime<Utc>) -> Self {
        self.trigger.start_time = time;
        self.trigger.next_fire_time = Some(time);
        self
    }

    pub fn due_in(self, offset: Duration) -> Self {
        self.starting_at(fixed_time() + offset)
    }

    pub fn with_next_fire_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.trigger.next_fire_time = time;
        self
    }

    pub fn with_previous_fire_time(mut self, time: DateTime<Utc>) -> Self {
        self.trigger.previous_fire_time = Some(time);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.trigger.priority = priority;
        self
    }

    pub fn with_state(mut self, state: TriggerState) -> Self {
        self.trigger.state = state;
        self
    }

    pub fn with_misfire_instruction(mut self, instruction: MisfireInstruction) -> Self {
        self.trigger.misfire_instruction = instruction;
        self
    }

    pub fn with_end_time(mut self, time: DateTime<Utc>) -> Self {
        self.trigger.end_time = Some(time);
        self
    }

    pub fn build(self) -> TriggerRecord {
        self.trigger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_builder_defaults() {
        let job = JobBuilder::new("g1", "job").requests_recovery().build();
        let trigger = TriggerBuilder::for_job("t1", &job).with_priority(7).build();

        assert_eq!(trigger.key, TriggerKey::new("g1", "t1"));
        assert_eq!(trigger.job_key, job.key);
        assert_eq!(trigger.state, TriggerState::Waiting);
        assert_eq!(trigger.next_fire_time, Some(fixed_time()));
        assert_eq!(trigger.priority, 7);
        assert!(job.requests_recovery);
    }
}
