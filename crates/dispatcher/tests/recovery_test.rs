mod common;

use chrono::Duration;
use futures::future::join_all;
use jobstore_core::Clock;
use jobstore_domain::{GroupMatcher, LockType, TriggerState};
use jobstore_testing_utils::{manual_clock, JobBuilder, TestStore, TriggerBuilder};

use common::{node, trigger_timeout, CHECKIN_INTERVAL_MS};

fn past_checkin_interval() -> Duration {
    Duration::milliseconds(CHECKIN_INTERVAL_MS as i64 + 1)
}

#[tokio::test]
async fn test_crash_before_fire_is_reacquired_once_after_timeout() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivors = [
        node(&store.repos, &clock, "node-b"),
        node(&store.repos, &clock, "node-c"),
    ];

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let orphaned = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    assert_eq!(orphaned.len(), 1);

    clock.advance(trigger_timeout());
    assert!(survivors[0]
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap()
        .is_empty());

    clock.advance(Duration::milliseconds(1));
    let attempts = join_all(
        survivors
            .iter()
            .map(|n| n.acquire_next_triggers(clock.now(), 1, Duration::zero())),
    )
    .await;
    let acquired: Vec<_> = attempts.into_iter().flat_map(|r| r.unwrap()).collect();
    assert_eq!(acquired.len(), 1);
    assert_eq!(acquired[0].key, trigger.key);
}

#[tokio::test]
async fn test_crash_before_fire_is_reacquired_across_sqlite_pools() {
    let mut store = TestStore::sqlite().await;
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let repos_b = store.connect_another().await;
    let repos_c = store.connect_another().await;
    let survivors = [node(&repos_b, &clock, "node-b"), node(&repos_c, &clock, "node-c")];

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();

    clock.advance(trigger_timeout() + Duration::milliseconds(1));
    let attempts = join_all(
        survivors
            .iter()
            .map(|n| n.acquire_next_triggers(clock.now(), 1, Duration::zero())),
    )
    .await;
    let acquired: Vec<_> = attempts.into_iter().flat_map(|r| r.unwrap()).collect();
    assert_eq!(acquired.len(), 1);

    let lock = store
        .repos
        .locks
        .find(LockType::Trigger, &trigger.key)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(lock.instance_id, "node-a");
}

#[tokio::test]
async fn test_recoverable_job_refires_with_recovery_marker() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "payment").requests_recovery().build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    let fired = crashed.triggers_fired(&acquired).await;
    assert!(fired[0].bundle().is_some());

    clock.advance(past_checkin_interval());
    let report = survivor.recover().await.unwrap();
    assert_eq!(report.recovered_triggers, 1);
    assert!(report.dead_instances.contains(&"node-a".to_string()));

    let stored = store.repos.triggers.find(&trigger.key).await.unwrap().unwrap();
    assert_eq!(stored.state, TriggerState::Waiting);
    assert!(stored.recovering);
    assert!(store.repos.locks.find_all().await.unwrap().is_empty());
    assert!(store
        .repos
        .schedulers
        .find_all("test-cluster")
        .await
        .unwrap()
        .is_empty());

    let reacquired = survivor
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    let refired = survivor.triggers_fired(&reacquired).await;
    let bundle = refired[0].bundle().unwrap();
    assert!(bundle.recovering);
    assert!(!bundle.trigger.recovering);
}

#[tokio::test]
async fn test_fired_one_shot_without_recovery_is_removed() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    crashed.triggers_fired(&acquired).await;

    clock.advance(past_checkin_interval());
    let report = survivor.recover().await.unwrap();

    assert_eq!(report.removed_triggers, 1);
    assert!(!survivor.check_trigger_exists(&trigger.key).await.unwrap());
    assert!(!survivor.check_job_exists(&job.key).await.unwrap());
    assert!(store.repos.locks.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeating_trigger_without_recovery_is_requeued() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::for_job("t1", &job).repeating(60_000).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    crashed.triggers_fired(&acquired).await;

    clock.advance(past_checkin_interval());
    let report = survivor.recover().await.unwrap();
    assert_eq!(report.requeued_triggers, 1);

    let stored = store.repos.triggers.find(&trigger.key).await.unwrap().unwrap();
    assert_eq!(stored.state, TriggerState::Waiting);
    assert!(!stored.recovering);
    assert_eq!(stored.fire_instance_id, None);
    assert_eq!(stored.next_fire_time, Some(trigger.start_time + Duration::minutes(1)));
}

#[tokio::test]
async fn test_recovery_is_idempotent() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "payment").requests_recovery().build();
    let trigger = TriggerBuilder::for_job("t1", &job).repeating(60_000).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    crashed.triggers_fired(&acquired).await;

    clock.advance(past_checkin_interval());
    let first = survivor.recover().await.unwrap();
    assert!(!first.is_empty());
    let after_first = store.repos.triggers.find(&trigger.key).await.unwrap();
    let locks_after_first = store.repos.locks.find_all().await.unwrap();

    let second = survivor.recover().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(store.repos.triggers.find(&trigger.key).await.unwrap(), after_first);
    assert_eq!(store.repos.locks.find_all().await.unwrap(), locks_after_first);
}

#[tokio::test]
async fn test_live_peer_locks_are_left_alone() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let busy = node(&store.repos, &clock, "node-a");
    let starting = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "payment").requests_recovery().build();
    let trigger = TriggerBuilder::for_job("t1", &job).build();
    busy.store_job_and_trigger(&job, &trigger).await.unwrap();
    busy.check_in().await.unwrap();
    busy.acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();

    clock.advance(Duration::milliseconds(CHECKIN_INTERVAL_MS as i64));
    let report = starting.recover().await.unwrap();

    assert!(report.is_empty());
    assert!(busy
        .lock_manager()
        .owns(LockType::Trigger, &trigger.key)
        .await
        .unwrap());
    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Acquired)
    );
}

#[tokio::test]
async fn test_restart_with_same_instance_id_recovers_own_locks() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let before = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").durable().build();
    let trigger = TriggerBuilder::for_job("t1", &job).repeating(60_000).build();
    before.store_job_and_trigger(&job, &trigger).await.unwrap();
    before.check_in().await.unwrap();
    before
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();

    let restarted = node(&store.repos, &clock, "node-a");
    let report = restarted.recover().await.unwrap();

    assert_eq!(report.requeued_triggers, 1);
    assert!(store.repos.locks.find_all().await.unwrap().is_empty());
    assert_eq!(
        store.repos.schedulers.find_all("test-cluster").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_dead_node_job_lock_is_released_and_siblings_unblocked() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "exclusive").non_concurrent().durable().build();
    let first = TriggerBuilder::for_job("first", &job).with_priority(9).build();
    let second = TriggerBuilder::for_job("second", &job).build();
    crashed.store_job(&job, false).await.unwrap();
    crashed.store_trigger(&first, false).await.unwrap();
    crashed.store_trigger(&second, false).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    crashed.triggers_fired(&acquired).await;
    assert_eq!(
        store.repos.triggers.get_state(&second.key).await.unwrap(),
        Some(TriggerState::Blocked)
    );

    clock.advance(past_checkin_interval());
    let report = survivor.recover().await.unwrap();

    assert_eq!(report.released_job_locks, 1);
    assert_eq!(
        store.repos.triggers.get_state(&second.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
    assert!(store.repos.locks.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recovered_trigger_in_paused_group_stays_paused() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let crashed = node(&store.repos, &clock, "node-a");
    let survivor = node(&store.repos, &clock, "node-b");

    let job = JobBuilder::new("jobs", "payment").requests_recovery().build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    crashed.store_job_and_trigger(&job, &trigger).await.unwrap();
    crashed.check_in().await.unwrap();
    let acquired = crashed
        .acquire_next_triggers(clock.now(), 1, Duration::zero())
        .await
        .unwrap();
    crashed.triggers_fired(&acquired).await;
    survivor
        .pause_triggers(&GroupMatcher::group_equals("g1"))
        .await
        .unwrap();

    clock.advance(past_checkin_interval());
    survivor.recover().await.unwrap();

    let stored = store.repos.triggers.find(&trigger.key).await.unwrap().unwrap();
    assert_eq!(stored.state, TriggerState::Paused);
    assert!(stored.recovering);

    survivor.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        survivor.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
}
