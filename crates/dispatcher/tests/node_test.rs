mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use jobstore_core::config::NodeConfig;
use jobstore_dispatcher::{JobExecutionContext, JobExecutor, SchedulerNode};
use jobstore_domain::{CompletedExecutionInstruction, TriggerState};
use jobstore_testing_utils::{manual_clock, JobBuilder, TestEnv, TestStore, TriggerBuilder};
use tokio::sync::broadcast;

use common::node;

struct CountingExecutor {
    executions: AtomicUsize,
    instruction: CompletedExecutionInstruction,
}

impl CountingExecutor {
    fn new(instruction: CompletedExecutionInstruction) -> Arc<Self> {
        Arc::new(Self {
            executions: AtomicUsize::new(0),
            instruction,
        })
    }

    fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for CountingExecutor {
    async fn execute(&self, context: &JobExecutionContext) -> CompletedExecutionInstruction {
        assert!(context.fire_instance_id.is_some());
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.instruction
    }
}

fn fast_loop() -> NodeConfig {
    NodeConfig {
        idle_wait_ms: 10,
        batch_size: 2,
        batch_time_window_ms: 0,
    }
}

#[tokio::test]
async fn test_run_once_executes_due_job_and_completes_trigger() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let job_store = Arc::new(node(&store.repos, &clock, "node-a"));

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    job_store.store_job_and_trigger(&job, &trigger).await.unwrap();

    let executor = CountingExecutor::new(CompletedExecutionInstruction::Noop);
    let scheduler = SchedulerNode::new(job_store.clone(), executor.clone(), Some(fast_loop()));

    assert_eq!(scheduler.run_once().await.unwrap(), 1);
    assert_eq!(executor.executions(), 1);
    assert!(!job_store.check_trigger_exists(&trigger.key).await.unwrap());
    assert!(store.repos.locks.find_all().await.unwrap().is_empty());

    assert_eq!(scheduler.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_re_execution_is_bounded() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let job_store = Arc::new(node(&store.repos, &clock, "node-a"));

    let job = JobBuilder::new("jobs", "flaky").durable().build();
    let trigger = TriggerBuilder::for_job("t1", &job).repeating(60_000).build();
    job_store.store_job_and_trigger(&job, &trigger).await.unwrap();

    let executor = CountingExecutor::new(CompletedExecutionInstruction::ReExecuteJob);
    let scheduler = SchedulerNode::new(job_store.clone(), executor.clone(), Some(fast_loop()));

    assert_eq!(scheduler.run_once().await.unwrap(), 1);
    assert_eq!(executor.executions(), 4);
    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_error_instruction_parks_trigger() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let job_store = Arc::new(node(&store.repos, &clock, "node-a"));

    let job = JobBuilder::new("jobs", "broken").durable().build();
    let trigger = TriggerBuilder::for_job("t1", &job).repeating(1_000).build();
    job_store.store_job_and_trigger(&job, &trigger).await.unwrap();

    let executor = CountingExecutor::new(CompletedExecutionInstruction::SetTriggerError);
    let scheduler = SchedulerNode::new(job_store.clone(), executor.clone(), Some(fast_loop()));
    scheduler.run_once().await.unwrap();

    assert_eq!(
        job_store.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Error)
    );
    assert_eq!(scheduler.run_once().await.unwrap(), 0);

    job_store.reset_trigger_from_error_state(&trigger.key).await.unwrap();
    assert_eq!(
        job_store.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown_signal() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let job_store = Arc::new(node(&store.repos, &clock, "node-a"));

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    job_store.store_job_and_trigger(&job, &trigger).await.unwrap();

    let executor = CountingExecutor::new(CompletedExecutionInstruction::Noop);
    let scheduler = SchedulerNode::new(job_store.clone(), executor.clone(), Some(fast_loop()));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let counter = executor.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let counter = counter.clone();
                async move { counter.executions() == 1 }
            },
            StdDuration::from_secs(5),
        )
        .await
    );

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(executor.executions(), 1);
}
