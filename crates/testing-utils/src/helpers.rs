//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobstore_core::{config::DatabaseConfig, ManualClock};
use jobstore_domain::Repositories;
use jobstore_infrastructure::{in_memory_repositories, DatabaseManager};
use tempfile::TempDir;
use tokio::time::sleep;

/// A fixed instant so time-dependent assertions are reproducible
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_462_820_481_910).unwrap_or_default()
}

/// A manual clock starting at [`fixed_time`]
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(fixed_time()))
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}

/// A store shared by simulated nodes
pub struct TestStore {
    pub repos: Repositories,
    dir: Option<TempDir>,
    managers: Vec<DatabaseManager>,
}

impl TestStore {
    pub fn in_memory() -> Self {
        Self {
            repos: in_memory_repositories(),
            dir: None,
            managers: Vec::new(),
        }
    }

    /// File-backed SQLite store in a temporary directory
    pub async fn sqlite() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let manager = open_sqlite(&dir).await;
        Self {
            repos: manager.repositories(),
            dir: Some(dir),
            managers: vec![manager],
        }
    }

    /// Another connection pool onto the same SQLite file, as a second node would open
    pub async fn connect_another(&mut self) -> Repositories {
        match &self.dir {
            Some(dir) => {
                let manager = open_sqlite(dir).await;
                let repos = manager.repositories();
                self.managers.push(manager);
                repos
            }
            None => self.repos.clone(),
        }
    }
}

async fn open_sqlite(dir: &TempDir) -> DatabaseManager {
    let path = dir.path().join("jobstore.db");
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        max_connections: 4,
        ..DatabaseConfig::default()
    };
    DatabaseManager::new(&config)
        .await
        .expect("open sqlite test store")
}
