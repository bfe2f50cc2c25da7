#![allow(async_fn_in_trait)]

//! Local fingerprint roster: sensor slot id → display name.
//!
//! Templates live on the sensor; the host only keeps names so the
//! management surface can label slots.

use crate::error::StorageResult;
use crate::models::FingerprintRow;
use sqlx::SqlitePool;

/// Repository trait for the fingerprint roster.
pub trait FingerprintRepository: Send + Sync {
    /// All roster entries, newest slot first.
    async fn list(&self) -> StorageResult<Vec<FingerprintRow>>;

    /// Register (or rename) a slot.
    async fn upsert(&self, slot: i64, name: &str) -> StorageResult<()>;

    /// Remove one slot from the roster.
    async fn delete(&self, slot: i64) -> StorageResult<()>;

    /// Empty the roster (after a sensor-wide delete).
    async fn clear(&self) -> StorageResult<u64>;
}

/// SQLite implementation of [`FingerprintRepository`].
#[derive(Debug, Clone)]
pub struct SqliteFingerprintRepository {
    pool: SqlitePool,
}

impl SqliteFingerprintRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl FingerprintRepository for SqliteFingerprintRepository {
    async fn list(&self) -> StorageResult<Vec<FingerprintRow>> {
        let rows = sqlx::query_as::<_, FingerprintRow>(
            "SELECT id, name FROM fingerprints ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert(&self, slot: i64, name: &str) -> StorageResult<()> {
        sqlx::query("INSERT OR REPLACE INTO fingerprints (id, name) VALUES (?, ?)")
            .bind(slot)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, slot: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM fingerprints WHERE id = ?")
            .bind(slot)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM fingerprints")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn repo() -> SqliteFingerprintRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteFingerprintRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_roster_roundtrip() {
        let repo = repo().await;

        repo.upsert(3, "alice").await.unwrap();
        repo.upsert(7, "bob").await.unwrap();

        let rows = repo.list().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].id, rows[0].name.as_str()), (7, "bob"));
        assert_eq!((rows[1].id, rows[1].name.as_str()), (3, "alice"));
    }

    #[tokio::test]
    async fn test_upsert_renames() {
        let repo = repo().await;
        repo.upsert(3, "alice").await.unwrap();
        repo.upsert(3, "alice b.").await.unwrap();

        let rows = repo.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "alice b.");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let repo = repo().await;
        repo.upsert(1, "a").await.unwrap();
        repo.upsert(2, "b").await.unwrap();

        repo.delete(1).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);

        assert_eq!(repo.clear().await.unwrap(), 1);
        assert!(repo.list().await.unwrap().is_empty());
    }
}
