use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobstore_core::JobStoreResult;
use jobstore_domain::{
    entities::TriggerRecord, repositories::TriggerRepository, JobKey, TriggerKey, TriggerState,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

/// 触发器表：`state`、`next_fire_time`、`priority` 为查询列，其余字段在文档中。
/// 状态以列为准，可单独条件更新。
pub struct SqliteTriggerRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteTriggerRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    fn row_to_trigger(row: &sqlx::sqlite::SqliteRow) -> JobStoreResult<TriggerRecord> {
        let document: String = row.try_get("document")?;
        let state: String = row.try_get("state")?;
        let mut trigger: TriggerRecord = MappingHelpers::from_document(&document)?;
        trigger.state = state.parse()?;
        Ok(trigger)
    }

    async fn write(&self, trigger: &TriggerRecord, upsert: bool) -> JobStoreResult<bool> {
        let conflict = if upsert {
            "DO UPDATE SET job_group = excluded.job_group, job_name = excluded.job_name,
                state = excluded.state, next_fire_time = excluded.next_fire_time,
                priority = excluded.priority, document = excluded.document"
        } else {
            "DO NOTHING"
        };

        let result = sqlx::query(&format!(
            "INSERT INTO {} (key_group, key_name, job_group, job_name, state, next_fire_time, priority, document)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (key_group, key_name) {conflict}",
            self.table
        ))
        .bind(&trigger.key.group)
        .bind(&trigger.key.name)
        .bind(&trigger.job_key.group)
        .bind(&trigger.job_key.name)
        .bind(trigger.state.as_str())
        .bind(trigger.next_fire_time.map(MappingHelpers::to_millis))
        .bind(trigger.priority)
        .bind(MappingHelpers::to_document(trigger)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl TriggerRepository for SqliteTriggerRepository {
    async fn insert(&self, trigger: &TriggerRecord) -> JobStoreResult<bool> {
        self.write(trigger, false).await
    }

    async fn save(&self, trigger: &TriggerRecord) -> JobStoreResult<()> {
        self.write(trigger, true).await?;
        debug!("保存触发器: {} 状态: {}", trigger.key, trigger.state);
        Ok(())
    }

    async fn find(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerRecord>> {
        let row = sqlx::query(&format!(
            "SELECT state, document FROM {} WHERE key_group = $1 AND key_name = $2",
            self.table
        ))
        .bind(&key.group)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_trigger).transpose()
    }

    async fn delete(&self, key: &TriggerKey) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE key_group = $1 AND key_name = $2",
            self.table
        ))
        .bind(&key.group)
        .bind(&key.name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_job(&self, job_key: &JobKey) -> JobStoreResult<Vec<TriggerRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT state, document FROM {} WHERE job_group = $1 AND job_name = $2
             ORDER BY key_group, key_name",
            self.table
        ))
        .bind(&job_key.group)
        .bind(&job_key.name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trigger).collect()
    }

    async fn find_all(&self) -> JobStoreResult<Vec<TriggerRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT state, document FROM {} ORDER BY key_group, key_name",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trigger).collect()
    }

    async fn find_due(
        &self,
        no_later_than: DateTime<Utc>,
        limit: usize,
    ) -> JobStoreResult<Vec<TriggerRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT state, document FROM {}
             WHERE state = 'WAITING'
               AND next_fire_time IS NOT NULL
               AND next_fire_time <= $1
             ORDER BY next_fire_time ASC, priority DESC
             LIMIT $2",
            self.table
        ))
        .bind(MappingHelpers::to_millis(no_later_than))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_trigger).collect()
    }

    async fn get_state(&self, key: &TriggerKey) -> JobStoreResult<Option<TriggerState>> {
        let state: Option<String> = sqlx::query_scalar(&format!(
            "SELECT state FROM {} WHERE key_group = $1 AND key_name = $2",
            self.table
        ))
        .bind(&key.group)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        state.map(|s| s.parse()).transpose()
    }

    async fn transfer_state(
        &self,
        key: &TriggerKey,
        from: TriggerState,
        to: TriggerState,
    ) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET state = $1 WHERE key_group = $2 AND key_name = $3 AND state = $4",
            self.table
        ))
        .bind(to.as_str())
        .bind(&key.group)
        .bind(&key.name)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_state(&self, key: &TriggerKey, state: TriggerState) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET state = $1 WHERE key_group = $2 AND key_name = $3",
            self.table
        ))
        .bind(state.as_str())
        .bind(&key.group)
        .bind(&key.name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> JobStoreResult<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear(&self) -> JobStoreResult<()> {
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
