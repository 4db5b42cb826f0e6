//! 集合（表）定义
//!
//! 所有表名共享配置的前缀，唯一约束即主键。

use jobstore_core::JobStoreResult;
use sqlx::SqlitePool;
use tracing::debug;

/// 一组带前缀的表名
#[derive(Debug, Clone)]
pub struct TableNames {
    pub jobs: String,
    pub triggers: String,
    pub calendars: String,
    pub locks: String,
    pub schedulers: String,
    pub paused_groups: String,
}

impl TableNames {
    pub fn new(prefix: &str) -> Self {
        Self {
            jobs: format!("{prefix}_jobs"),
            triggers: format!("{prefix}_triggers"),
            calendars: format!("{prefix}_calendars"),
            locks: format!("{prefix}_locks"),
            schedulers: format!("{prefix}_schedulers"),
            paused_groups: format!("{prefix}_paused_groups"),
        }
    }
}

pub async fn ensure_schema(pool: &SqlitePool, tables: &TableNames) -> JobStoreResult<()> {
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key_group TEXT NOT NULL,
                key_name TEXT NOT NULL,
                document TEXT NOT NULL,
                PRIMARY KEY (key_group, key_name)
            )",
            tables.jobs
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key_group TEXT NOT NULL,
                key_name TEXT NOT NULL,
                job_group TEXT NOT NULL,
                job_name TEXT NOT NULL,
                state TEXT NOT NULL,
                next_fire_time INTEGER,
                priority INTEGER NOT NULL,
                document TEXT NOT NULL,
                PRIMARY KEY (key_group, key_name)
            )",
            tables.triggers
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_due ON {0} (state, next_fire_time, priority)",
            tables.triggers
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_job ON {0} (job_group, job_name)",
            tables.triggers
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name TEXT NOT NULL PRIMARY KEY,
                document TEXT NOT NULL
            )",
            tables.calendars
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                lock_type TEXT NOT NULL,
                key_group TEXT NOT NULL,
                key_name TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                locked_at INTEGER NOT NULL,
                PRIMARY KEY (lock_type, key_group, key_name)
            )",
            tables.locks
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                scheduler_name TEXT NOT NULL,
                instance_id TEXT NOT NULL,
                last_checkin INTEGER NOT NULL,
                checkin_interval INTEGER NOT NULL,
                PRIMARY KEY (scheduler_name, instance_id)
            )",
            tables.schedulers
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                kind TEXT NOT NULL,
                group_name TEXT NOT NULL,
                PRIMARY KEY (kind, group_name)
            )",
            tables.paused_groups
        ),
    ];

    for statement in &statements {
        sqlx::query(statement).execute(pool).await?;
    }

    debug!("数据表检查完成: 前缀 {}", tables.jobs.trim_end_matches("_jobs"));
    Ok(())
}
