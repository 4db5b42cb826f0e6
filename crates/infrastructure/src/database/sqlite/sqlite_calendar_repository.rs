use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::CalendarRecord, repositories::CalendarRepository};
use sqlx::{Row, SqlitePool};

use crate::database::mapping::MappingHelpers;

pub struct SqliteCalendarRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteCalendarRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    fn row_to_calendar(row: &sqlx::sqlite::SqliteRow) -> JobStoreResult<CalendarRecord> {
        let document: String = row.try_get("document")?;
        Ok(CalendarRecord {
            name: row.try_get("name")?,
            data: MappingHelpers::from_document(&document)?,
        })
    }

    async fn write(&self, calendar: &CalendarRecord, upsert: bool) -> JobStoreResult<bool> {
        let conflict = if upsert {
            "DO UPDATE SET document = excluded.document"
        } else {
            "DO NOTHING"
        };
        let result = sqlx::query(&format!(
            "INSERT INTO {} (name, document) VALUES ($1, $2) ON CONFLICT (name) {conflict}",
            self.table
        ))
        .bind(&calendar.name)
        .bind(MappingHelpers::to_document(&calendar.data)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CalendarRepository for SqliteCalendarRepository {
    async fn insert(&self, calendar: &CalendarRecord) -> JobStoreResult<bool> {
        self.write(calendar, false).await
    }

    async fn save(&self, calendar: &CalendarRecord) -> JobStoreResult<()> {
        self.write(calendar, true).await?;
        Ok(())
    }

    async fn find(&self, name: &str) -> JobStoreResult<Option<CalendarRecord>> {
        let row = sqlx::query(&format!(
            "SELECT name, document FROM {} WHERE name = $1",
            self.table
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_calendar).transpose()
    }

    async fn delete(&self, name: &str) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE name = $1", self.table))
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn names(&self) -> JobStoreResult<Vec<String>> {
        let names = sqlx::query_scalar(&format!("SELECT name FROM {} ORDER BY name", self.table))
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
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
