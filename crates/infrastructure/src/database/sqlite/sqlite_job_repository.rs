use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::JobRecord, repositories::JobRepository, JobKey};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::database::mapping::MappingHelpers;

pub struct SqliteJobRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> JobStoreResult<JobRecord> {
        let document: String = row.try_get("document")?;
        MappingHelpers::from_document(&document)
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &JobRecord) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (key_group, key_name, document) VALUES ($1, $2, $3)
             ON CONFLICT (key_group, key_name) DO NOTHING",
            self.table
        ))
        .bind(&job.key.group)
        .bind(&job.key.name)
        .bind(MappingHelpers::to_document(job)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save(&self, job: &JobRecord) -> JobStoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO {} (key_group, key_name, document) VALUES ($1, $2, $3)
             ON CONFLICT (key_group, key_name) DO UPDATE SET document = excluded.document",
            self.table
        ))
        .bind(&job.key.group)
        .bind(&job.key.name)
        .bind(MappingHelpers::to_document(job)?)
        .execute(&self.pool)
        .await?;

        debug!("保存作业: {}", job.key);
        Ok(())
    }

    async fn find(&self, key: &JobKey) -> JobStoreResult<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT document FROM {} WHERE key_group = $1 AND key_name = $2",
            self.table
        ))
        .bind(&key.group)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn delete(&self, key: &JobKey) -> JobStoreResult<bool> {
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

    async fn find_all(&self) -> JobStoreResult<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT document FROM {} ORDER BY key_group, key_name",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
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
