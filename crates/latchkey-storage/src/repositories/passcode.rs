#![allow(async_fn_in_trait)]

//! Passcode persistence and the production [`CredentialStore`].

use crate::error::StorageResult;
use crate::models::PasscodeRow;
use chrono::{Duration, Utc};
use latchkey_core::constants::DEFAULT_GUEST_VALID_MINUTES;
use latchkey_core::{Credential, CredentialStore, Passcode, Result as CoreResult};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::debug;

/// SHA-256 of the code, hex-encoded. The comparison key for verification.
#[must_use]
pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Repository trait for passcode entity operations.
///
/// Uses native async trait methods (Edition 2024), same as the other
/// repositories in this crate.
pub trait PasscodeRepository: Send + Sync {
    /// Install `code` as the main passcode, demoting any previous main.
    async fn set_main(&self, code: &Passcode) -> StorageResult<i64>;

    /// Create a guest code valid for `minutes_valid` minutes (default 60
    /// when `None`). One-time codes stop validating after first use.
    async fn create_guest(
        &self,
        code: &Passcode,
        minutes_valid: Option<i64>,
        one_time: bool,
    ) -> StorageResult<i64>;

    /// Whether a main passcode is installed.
    async fn has_main(&self) -> StorageResult<bool>;

    /// Hash-verify a code against the main passcode.
    async fn verify_main_hash(&self, code: &str) -> StorageResult<bool>;

    /// Active guests: unexpired and unused, ordered `valid_until ASC, id ASC`.
    async fn list_active_guests(&self) -> StorageResult<Vec<PasscodeRow>>;

    /// Display form of the main code, empty when none installed.
    async fn reveal_main(&self) -> StorageResult<String>;

    /// Display form of one guest code, empty when unknown.
    async fn reveal_guest(&self, id: i64) -> StorageResult<String>;

    /// Mark a code used. Idempotent.
    async fn mark_used(&self, id: i64) -> StorageResult<()>;

    /// Delete one guest code. The main code cannot be deleted this way.
    async fn delete_guest(&self, id: i64) -> StorageResult<()>;
}

/// SQLite implementation of [`PasscodeRepository`].
#[derive(Debug, Clone)]
pub struct SqlitePasscodeRepository {
    pool: SqlitePool,
}

impl SqlitePasscodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl PasscodeRepository for SqlitePasscodeRepository {
    async fn set_main(&self, code: &Passcode) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE passcodes SET is_main = 0 WHERE is_main = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO passcodes (code_hash, code_masked, is_main, is_one_time, used)
            VALUES (?, ?, 1, 0, 0)
            "#,
        )
        .bind(hash_code(code.as_str()))
        .bind(code.masked())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("main passcode updated");
        Ok(result.last_insert_rowid())
    }

    async fn create_guest(
        &self,
        code: &Passcode,
        minutes_valid: Option<i64>,
        one_time: bool,
    ) -> StorageResult<i64> {
        let minutes = minutes_valid.unwrap_or(DEFAULT_GUEST_VALID_MINUTES).max(1);
        let valid_until = Utc::now() + Duration::minutes(minutes);

        let result = sqlx::query(
            r#"
            INSERT INTO passcodes (code_hash, code_masked, is_main, is_one_time, used, valid_until)
            VALUES (?, ?, 0, ?, 0, ?)
            "#,
        )
        .bind(hash_code(code.as_str()))
        .bind(code.masked())
        .bind(one_time)
        .bind(valid_until)
        .execute(&self.pool)
        .await?;

        debug!(one_time, minutes, "guest passcode created");
        Ok(result.last_insert_rowid())
    }

    async fn has_main(&self) -> StorageResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM passcodes WHERE is_main = 1 LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn verify_main_hash(&self, code: &str) -> StorageResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM passcodes WHERE is_main = 1 AND code_hash = ? LIMIT 1",
        )
        .bind(hash_code(code))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn list_active_guests(&self) -> StorageResult<Vec<PasscodeRow>> {
        let rows = sqlx::query_as::<_, PasscodeRow>(
            r#"
            SELECT id, code_hash, code_masked, is_main, is_one_time, used, valid_until
            FROM passcodes
            WHERE is_main = 0 AND used = 0
              AND valid_until IS NOT NULL AND valid_until >= ?
            ORDER BY valid_until ASC, id ASC
            "#,
        )
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn reveal_main(&self) -> StorageResult<String> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT code_masked FROM passcodes WHERE is_main = 1 ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or_default())
    }

    async fn reveal_guest(&self, id: i64) -> StorageResult<String> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT code_masked FROM passcodes WHERE id = ? AND is_main = 0 LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or_default())
    }

    async fn mark_used(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE passcodes SET used = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_guest(&self, id: i64) -> StorageResult<()> {
        sqlx::query("DELETE FROM passcodes WHERE id = ? AND is_main = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// The production credential store handed to the door controller.
impl CredentialStore for SqlitePasscodeRepository {
    async fn verify_main(&self, code: &str) -> CoreResult<bool> {
        Ok(self.verify_main_hash(code).await?)
    }

    async fn list_active_guests(&self) -> CoreResult<Vec<Credential>> {
        let rows = PasscodeRepository::list_active_guests(self).await?;
        Ok(rows.iter().map(PasscodeRow::to_credential).collect())
    }

    async fn reveal_main(&self) -> CoreResult<String> {
        Ok(PasscodeRepository::reveal_main(self).await?)
    }

    async fn reveal_guest(&self, id: i64) -> CoreResult<String> {
        Ok(PasscodeRepository::reveal_guest(self, id).await?)
    }

    async fn mark_used(&self, id: i64) -> CoreResult<()> {
        Ok(PasscodeRepository::mark_used(self, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn repo() -> SqlitePasscodeRepository {
        let db = Database::in_memory().await.unwrap();
        SqlitePasscodeRepository::new(db.pool().clone())
    }

    fn code(s: &str) -> Passcode {
        Passcode::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_set_main_demotes_previous() {
        let repo = repo().await;
        assert!(!repo.has_main().await.unwrap());

        repo.set_main(&code("1111")).await.unwrap();
        repo.set_main(&code("2222")).await.unwrap();

        assert!(repo.has_main().await.unwrap());
        assert!(!repo.verify_main_hash("1111").await.unwrap());
        assert!(repo.verify_main_hash("2222").await.unwrap());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM passcodes WHERE is_main = 1")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_guest_lifecycle() {
        let repo = repo().await;
        let id = repo
            .create_guest(&code("4321"), Some(60), true)
            .await
            .unwrap();

        let guests = PasscodeRepository::list_active_guests(&repo).await.unwrap();
        assert_eq!(guests.len(), 1);
        assert_eq!(guests[0].id, id);
        assert!(guests[0].is_one_time);
        assert_eq!(PasscodeRepository::reveal_guest(&repo, id).await.unwrap(), "4321");

        PasscodeRepository::mark_used(&repo, id).await.unwrap();
        assert!(
            PasscodeRepository::list_active_guests(&repo)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_expired_guests_excluded() {
        let repo = repo().await;
        // Insert a guest whose validity is already over.
        sqlx::query(
            r#"
            INSERT INTO passcodes (code_hash, code_masked, is_main, is_one_time, used, valid_until)
            VALUES (?, '9999', 0, 0, 0, ?)
            "#,
        )
        .bind(hash_code("9999"))
        .bind(Utc::now() - Duration::minutes(5))
        .execute(&repo.pool)
        .await
        .unwrap();

        assert!(
            PasscodeRepository::list_active_guests(&repo)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_active_guests_ordered_by_expiry() {
        let repo = repo().await;
        let late = repo
            .create_guest(&code("2222"), Some(120), false)
            .await
            .unwrap();
        let early = repo
            .create_guest(&code("1111"), Some(10), false)
            .await
            .unwrap();

        let guests = PasscodeRepository::list_active_guests(&repo).await.unwrap();
        assert_eq!(
            guests.iter().map(|g| g.id).collect::<Vec<_>>(),
            vec![early, late]
        );
    }

    #[tokio::test]
    async fn test_delete_guest_ignores_main() {
        let repo = repo().await;
        repo.set_main(&code("1234")).await.unwrap();
        let guest = repo
            .create_guest(&code("4321"), None, false)
            .await
            .unwrap();

        // Find the main row id and try to delete it as a guest.
        let main_id: (i64,) = sqlx::query_as("SELECT id FROM passcodes WHERE is_main = 1")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        repo.delete_guest(main_id.0).await.unwrap();
        assert!(repo.has_main().await.unwrap());

        repo.delete_guest(guest).await.unwrap();
        assert_eq!(PasscodeRepository::reveal_guest(&repo, guest).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_reveal_main_empty_when_absent() {
        let repo = repo().await;
        assert_eq!(PasscodeRepository::reveal_main(&repo).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_hash_is_stable() {
        assert_eq!(hash_code("1234"), hash_code("1234"));
        assert_ne!(hash_code("1234"), hash_code("1235"));
        assert_eq!(hash_code("1234").len(), 64);
    }
}
