use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jobstore_core::{config::DatabaseConfig, JobStoreError, JobStoreResult};
use jobstore_domain::Repositories;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::schema::{ensure_schema, TableNames};
use super::sqlite::{
    SqliteCalendarRepository, SqliteJobRepository, SqliteLockRepository,
    SqlitePausedGroupRepository, SqliteSchedulerRepository, SqliteTriggerRepository,
};

/// SQLite 存储管理：连接池、表结构与仓储工厂
pub struct DatabaseManager {
    pool: SqlitePool,
    tables: TableNames,
}

impl DatabaseManager {
    /// 建立连接池并确保表结构存在，失败属于致命配置错误
    pub async fn new(config: &DatabaseConfig) -> JobStoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| JobStoreError::config_error(format!("无效的数据库URL {}: {e}", config.url)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));

        // 内存数据库每个连接各自独立，只能使用单连接
        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                .max_lifetime(Duration::from_secs(1800)) // 30分钟默认生命周期
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| JobStoreError::config_error(format!("无法连接数据库 {}: {e}", config.url)))?;

        Self::from_pool(pool, &config.collection_prefix).await
    }

    pub async fn from_pool(pool: SqlitePool, collection_prefix: &str) -> JobStoreResult<Self> {
        let tables = TableNames::new(collection_prefix);
        ensure_schema(&pool, &tables).await?;
        info!("数据库已就绪: 集合前缀 {}", collection_prefix);
        Ok(Self { pool, tables })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub async fn health_check(&self) -> JobStoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 基于同一连接池的全部仓储
    pub fn repositories(&self) -> Repositories {
        Repositories {
            jobs: Arc::new(SqliteJobRepository::new(
                self.pool.clone(),
                self.tables.jobs.clone(),
            )),
            triggers: Arc::new(SqliteTriggerRepository::new(
                self.pool.clone(),
                self.tables.triggers.clone(),
            )),
            locks: Arc::new(SqliteLockRepository::new(
                self.pool.clone(),
                self.tables.locks.clone(),
            )),
            schedulers: Arc::new(SqliteSchedulerRepository::new(
                self.pool.clone(),
                self.tables.schedulers.clone(),
            )),
            paused_groups: Arc::new(SqlitePausedGroupRepository::new(
                self.pool.clone(),
                self.tables.paused_groups.clone(),
            )),
            calendars: Arc::new(SqliteCalendarRepository::new(
                self.pool.clone(),
                self.tables.calendars.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_bootstrap() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let manager = DatabaseManager::new(&config).await.unwrap();
        assert!(manager.health_check().await.is_ok());
        assert_eq!(manager.tables().locks, "jobstore_locks");

        // 重复建表不报错
        ensure_schema(manager.pool(), manager.tables()).await.unwrap();
        manager.close().await;
    }
}
