use async_trait::async_trait;
use jobstore_core::JobStoreResult;
use jobstore_domain::{entities::LockRecord, repositories::LockRepository, Key, LockType};
use sqlx::{Row, SqlitePool};

use crate::database::mapping::MappingHelpers;

/// 锁表，主键 (lock_type, key_group, key_name) 保证同一键最多一条锁记录
pub struct SqliteLockRepository {
    pool: SqlitePool,
    table: String,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool, table: String) -> Self {
        Self { pool, table }
    }

    fn row_to_lock(row: &sqlx::sqlite::SqliteRow) -> JobStoreResult<LockRecord> {
        let lock_type: String = row.try_get("lock_type")?;
        Ok(LockRecord {
            lock_type: lock_type.parse()?,
            key: Key::new(
                row.try_get::<String, _>("key_group")?,
                row.try_get::<String, _>("key_name")?,
            ),
            instance_id: row.try_get("instance_id")?,
            locked_at: MappingHelpers::from_millis(row.try_get("locked_at")?)?,
        })
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn insert_if_absent(&self, lock: &LockRecord) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (lock_type, key_group, key_name, instance_id, locked_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (lock_type, key_group, key_name) DO NOTHING",
            self.table
        ))
        .bind(lock.lock_type.as_str())
        .bind(&lock.key.group)
        .bind(&lock.key.name)
        .bind(&lock.instance_id)
        .bind(MappingHelpers::to_millis(lock.locked_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, lock_type: LockType, key: &Key) -> JobStoreResult<Option<LockRecord>> {
        let row = sqlx::query(&format!(
            "SELECT lock_type, key_group, key_name, instance_id, locked_at FROM {}
             WHERE lock_type = $1 AND key_group = $2 AND key_name = $3",
            self.table
        ))
        .bind(lock_type.as_str())
        .bind(&key.group)
        .bind(&key.name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_lock).transpose()
    }

    async fn compare_and_delete(&self, expected: &LockRecord) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE lock_type = $1 AND key_group = $2 AND key_name = $3
             AND instance_id = $4 AND locked_at = $5",
            self.table
        ))
        .bind(expected.lock_type.as_str())
        .bind(&expected.key.group)
        .bind(&expected.key.name)
        .bind(&expected.instance_id)
        .bind(MappingHelpers::to_millis(expected.locked_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_if_owned(
        &self,
        lock_type: LockType,
        key: &Key,
        instance_id: &str,
    ) -> JobStoreResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE lock_type = $1 AND key_group = $2 AND key_name = $3
             AND instance_id = $4",
            self.table
        ))
        .bind(lock_type.as_str())
        .bind(&key.group)
        .bind(&key.name)
        .bind(instance_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_all(&self) -> JobStoreResult<Vec<LockRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT lock_type, key_group, key_name, instance_id, locked_at FROM {}
             ORDER BY lock_type, key_group, key_name",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_lock).collect()
    }
}
