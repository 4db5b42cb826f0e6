use std::collections::HashSet;

use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{repositories::PausedGroupRepository, PausedGroupKind};
use sqlx::SqlitePool;

pub struct SqlitePausedGroupRepository {
    pool: SqlitePool,
    table: String,
}

impl SqlitePausedGroupRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }
}

#[async_trait]
impl PausedGroupRepository for SqlitePausedGroupRepository {
    async fn add(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (kind, group_name) VALUES ($1, $2)
             ON CONFLICT (kind, group_name) DO NOTHING",
            self.table
        ))
        .bind(kind.as_str())
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE kind = $1 AND group_name = $2",
            self.table
        ))
        .bind(kind.as_str())
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, kind: PausedGroupKind) -> JobStoreResult<HashSet<String>> {
        let groups: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT group_name FROM {} WHERE kind = $1",
            self.table
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(groups.into_iter().collect())
    }

    async fn contains(&self, kind: PausedGroupKind, group: &str) -> JobStoreResult<bool> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE kind = $1 AND group_name = $2",
            self.table
        ))
        .bind(kind.as_str())
        .bind(group)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn clear(&self, kind: PausedGroupKind) -> JobStoreResult<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE kind = $1", self.table))
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
