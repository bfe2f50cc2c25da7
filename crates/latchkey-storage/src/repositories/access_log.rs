#![allow(async_fn_in_trait)]

//! Access-log persistence and the production [`AccessLog`] sink.

use crate::error::StorageResult;
use crate::models::AccessLogRow;
use chrono::{DateTime, TimeZone, Utc};
use latchkey_core::{AccessAttempt, AccessLog, Result as CoreResult};
use sqlx::SqlitePool;

/// Repository trait for access-log entity operations, supporting the audit
/// trail and the management surface's history views.
pub trait AccessLogRepository: Send + Sync {
    /// Record one attempt.
    async fn create(&self, attempt: &AccessAttempt) -> StorageResult<i64>;

    /// Most recent granted attempts (door openings), newest first.
    async fn find_recent_granted(&self, limit: i64) -> StorageResult<Vec<AccessLogRow>>;

    /// All attempts within a time range, newest first.
    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AccessLogRow>>;

    /// All attempts in one calendar month, newest first.
    async fn find_by_month(&self, year: i32, month: u32) -> StorageResult<Vec<AccessLogRow>>;

    /// Delete every attempt in one calendar month.
    async fn clear_month(&self, year: i32, month: u32) -> StorageResult<u64>;

    /// Delete a single entry.
    async fn delete(&self, id: i64) -> StorageResult<()>;
}

/// Half-open UTC range covering one calendar month.
fn month_range(year: i32, month: u32) -> StorageResult<(DateTime<Utc>, DateTime<Utc>)> {
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| crate::error::StorageError::Validation(format!(
            "invalid month {year}-{month}"
        )))?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| crate::error::StorageError::Validation(format!(
            "invalid month {year}-{month}"
        )))?;
    Ok((start, end))
}

/// SQLite implementation of [`AccessLogRepository`].
#[derive(Debug, Clone)]
pub struct SqliteAccessLogRepository {
    pool: SqlitePool,
}

impl SqliteAccessLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccessLogRepository for SqliteAccessLogRepository {
    async fn create(&self, attempt: &AccessAttempt) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO access_log (method, result, passcode_masked, passcode_hash, confidence, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.method.as_str())
        .bind(attempt.outcome.as_str())
        .bind(&attempt.masked_code)
        .bind(&attempt.code_hash)
        .bind(attempt.confidence)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_recent_granted(&self, limit: i64) -> StorageResult<Vec<AccessLogRow>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(
            r#"
            SELECT id, method, result, passcode_masked, passcode_hash, confidence, timestamp
            FROM access_log
            WHERE result = 'granted'
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<AccessLogRow>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(
            r#"
            SELECT id, method, result, passcode_masked, passcode_hash, confidence, timestamp
            FROM access_log
            WHERE timestamp >= ? AND timestamp < ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_by_month(&self, year: i32, month: u32) -> StorageResult<Vec<AccessLogRow>> {
        let (start, end) = month_range(year, month)?;
        self.find_by_time_range(start, end).await
    }

    async fn clear_month(&self, year: i32, month: u32) -> StorageResult<u64> {
        let (start, end) = month_range(year, month)?;
        let result = sqlx::query("DELETE FROM access_log WHERE timestamp >= ? AND timestamp < ?")
            .bind(start)
            .bind(end)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM access_log WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// The production audit sink handed to the door controller.
impl AccessLog for SqliteAccessLogRepository {
    async fn record(&self, attempt: AccessAttempt) -> CoreResult<()> {
        self.create(&attempt).await?;
        Ok(())
    }
}
