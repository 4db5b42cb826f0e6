mod common;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobstore_core::JobStoreResult;
use jobstore_dispatcher::TriggerStateManager;
use jobstore_domain::{
    repositories::{PausedGroupRepository, TriggerRepository},
    GroupMatcher, JobKey, PausedGroupKind, TriggerKey, TriggerRecord, TriggerState,
};
use jobstore_infrastructure::InMemoryJobRepository;
use jobstore_testing_utils::{manual_clock, JobBuilder, TestStore, TriggerBuilder};
use mockall::mock;

use common::node;

mock! {
    pub Triggers {}

    #[async_trait]
    impl TriggerRepository for Triggers {
        async fn insert(&self, trigger: &TriggerRecord) -> JobStoreResult<bool>;
        async fn save(&self, trigger: &TriggerRecord) -> JobStoreResult<()>;
        async fn find(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>>;
        async fn delete(&self, key: &TriggerKey) -> JobStoreResult<bool>;
        async fn find_by_job(&self, job_key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>>;
        async fn find_all(&self) -> JobStoreResult<Vec<TriggerRecord>>;
        async fn find_due(
            &self,
            no_later_than: DateTime<Utc>,
            limit: usize,
        ) -> JobStoreResult<Vec<TriggerRecord>>;
        async fn get_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>>;
        async fn transfer_state(
            &self,
            key: &TriggerKey,
            from: TriggerState,
            to: TriggerState,
        ) -> JobStoreResult<bool>;
        async fn update_state(&self, key: &TriggerKey, state: TriggerState) -> JobStoreResult<bool>;
        async fn count(&self) -> JobStoreResult<usize>;
        async fn clear(&self) -> JobStoreResult<()>;
    }
}

mock! {
    pub PausedGroups {}

    #[async_trait]
    impl PausedGroupRepository for PausedGroups {
        async fn add(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<()>;
        async fn remove(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool>;
        async fn list(&self, kind: PausedGroupKind) -> JobStoreResult<HashSet<String>>;
        async fn contains(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool>;
        async fn clear(&self, kind: PausedGroupKind) -> JobStoreResult<()>;
    }
}

#[tokio::test]
async fn test_reset_from_error_on_healthy_trigger_writes_nothing() {
    let mut triggers = MockTriggers::new();
    triggers
        .expect_get_state()
        .times(1)
        .returning(|_| Ok(Some(TriggerState::Waiting)));
    triggers.expect_transfer_state().times(0);
    triggers.expect_update_state().times(0);
    triggers.expect_save().times(0);

    let mut paused_groups = MockPausedGroups::new();
    paused_groups.expect_contains().times(0);

    let manager = TriggerStateManager::new(
        Arc::new(triggers),
        Arc::new(InMemoryJobRepository::new()),
        Arc::new(paused_groups),
    );

    manager
        .reset_trigger_from_error_state(&TriggerKey::new("g1", "t1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reset_from_error_on_missing_trigger_writes_nothing() {
    let mut triggers = MockTriggers::new();
    triggers.expect_get_state().times(1).returning(|_| Ok(None));
    triggers.expect_transfer_state().times(0);

    let mut paused_groups = MockPausedGroups::new();
    paused_groups.expect_contains().times(0);

    let manager = TriggerStateManager::new(
        Arc::new(triggers),
        Arc::new(InMemoryJobRepository::new()),
        Arc::new(paused_groups),
    );

    manager
        .reset_trigger_from_error_state(&TriggerKey::new("g1", "missing"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reset_from_error_returns_to_waiting_or_paused() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").durable().build();
    let active = TriggerBuilder::new("g1", "active", &job.key).build();
    let held = TriggerBuilder::new("g2", "held", &job.key).build();
    node.store_job(&job, false).await.unwrap();
    node.store_trigger(&active, false).await.unwrap();
    node.store_trigger(&held, false).await.unwrap();

    for key in [&active.key, &held.key] {
        store
            .repos
            .triggers
            .update_state(key, TriggerState::Error)
            .await
            .unwrap();
    }
    node.pause_triggers(&GroupMatcher::group_equals("g2")).await.unwrap();

    node.reset_trigger_from_error_state(&active.key).await.unwrap();
    node.reset_trigger_from_error_state(&held.key).await.unwrap();

    assert_eq!(
        store.repos.triggers.get_state(&active.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
    assert_eq!(
        store.repos.triggers.get_state(&held.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
}

#[tokio::test]
async fn test_pause_and_resume_single_trigger() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();

    node.pause_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );

    node.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_pause_blocked_trigger_becomes_paused_blocked() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();
    store
        .repos
        .triggers
        .update_state(&trigger.key, TriggerState::Blocked)
        .await
        .unwrap();

    node.pause_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::PausedBlocked)
    );

    node.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Blocked)
    );
}

#[tokio::test]
async fn test_group_pause_wins_over_individual_resume() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();

    let paused = node.pause_triggers(&GroupMatcher::group_equals("g1")).await.unwrap();
    assert_eq!(paused, vec!["g1".to_string()]);

    node.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );

    node.resume_triggers(&GroupMatcher::group_equals("g1")).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_paused_job_group_blocks_trigger_resume() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("reports", "daily").build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();

    node.pause_jobs(&GroupMatcher::group_equals("reports")).await.unwrap();
    node.resume_trigger(&trigger.key).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
    assert_eq!(node.get_paused_job_groups().await.unwrap(), vec!["reports".to_string()]);

    node.resume_jobs(&GroupMatcher::group_equals("reports")).await.unwrap();
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
}

#[tokio::test]
async fn test_trigger_stored_into_paused_group_starts_paused() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let paused = node.pause_triggers(&GroupMatcher::group_equals("later")).await.unwrap();
    assert_eq!(paused, vec!["later".to_string()]);

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::new("later", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();

    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
}

#[tokio::test]
async fn test_effective_state_reflects_group_pause() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").build();
    let trigger = TriggerBuilder::new("g1", "t1", &job.key).build();
    node.store_job_and_trigger(&job, &trigger).await.unwrap();

    // 直接写入暂停分组，触发器记录本身仍是 WAITING
    store
        .repos
        .paused_groups
        .add(PausedGroupKind::Trigger, "g1")
        .await
        .unwrap();

    assert_eq!(
        store.repos.triggers.get_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Waiting)
    );
    assert_eq!(
        node.get_trigger_state(&trigger.key).await.unwrap(),
        Some(TriggerState::Paused)
    );
    assert_eq!(node.get_trigger_state(&TriggerKey::new("g1", "none")).await.unwrap(), None);
}

#[tokio::test]
async fn test_pause_all_and_resume_all() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let job = JobBuilder::new("jobs", "report").build();
    let first = TriggerBuilder::new("g1", "t1", &job.key).build();
    let second = TriggerBuilder::new("g2", "t2", &job.key).build();
    node.store_job(&job, false).await.unwrap();
    node.store_trigger(&first, false).await.unwrap();
    node.store_trigger(&second, false).await.unwrap();
    node.pause_jobs(&GroupMatcher::group_equals("jobs")).await.unwrap();

    node.pause_all().await.unwrap();
    let mut groups = node.get_paused_trigger_groups().await.unwrap();
    groups.sort();
    assert_eq!(groups, vec!["g1".to_string(), "g2".to_string()]);

    node.resume_all().await.unwrap();
    assert!(node.get_paused_trigger_groups().await.unwrap().is_empty());
    assert!(node.get_paused_job_groups().await.unwrap().is_empty());
    for key in [&first.key, &second.key] {
        assert_eq!(
            node.get_trigger_state(key).await.unwrap(),
            Some(TriggerState::Waiting)
        );
    }
}
