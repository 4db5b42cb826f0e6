use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::SchedulerRecord, repositories::SchedulerRepository};
use sqlx::{Row, SqlitePool};

use crate::database::mapping::MappingHelpers;

pub struct SqliteSchedulerRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteSchedulerRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> JobStoreResult<SchedulerRecord> {
        Ok(SchedulerRecord {
            scheduler_name: row.try_get("scheduler_name")?,
            instance_id: row.try_get("instance_id")?,
            last_checkin: MappingHelpers::from_millis(row.try_get("last_checkin")?)?,
            checkin_interval_ms: row.try_get("checkin_interval")?,
        })
    }
}

#[async_trait]
impl SchedulerRepository for SqliteSchedulerRepository {
    async fn check_in(&self, record: &SchedulerRecord) -> JobStoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (scheduler_name, instance_id, last_checkin, checkin_interval)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (scheduler_name, instance_id) DO UPDATE SET
                last_checkin = excluded.last_checkin,
                checkin_interval = excluded.checkin_interval",
            self.table
        ))
        .bind(&record.scheduler_name)
        .bind(&record.instance_id)
        .bind(MappingHelpers::to_millis(record.last_checkin))
        .bind(record.checkin_interval_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_all(&self, scheduler_name: &str) -> JobStoreResult<Vec<SchedulerRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT scheduler_name, instance_id, last_checkin, checkin_interval FROM {}
             WHERE scheduler_name = $1 ORDER BY instance_id",
            self.table
        ))
        .bind(scheduler_name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn remove(&self, scheduler_name: &str, instance_id: &str) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE scheduler_name = $1 AND instance_id = $2",
            self.table
        ))
        .bind(scheduler_name)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
