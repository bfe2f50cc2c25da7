#![allow(async_fn_in_trait)]

//! Singleton settings row and the production [`SettingsSource`].

use crate::error::StorageResult;
use crate::models::SettingsRow;
use latchkey_core::{Result as CoreResult, Settings, SettingsSource};
use sqlx::SqlitePool;

const SETTINGS_ID: i64 = 1;

/// A named feature toggle.
///
/// Typed rather than stringly so the column name can never be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingToggle {
    Passcode,
    FaceRecognition,
    Fingerprint,
}

impl SettingToggle {
    fn column(self) -> &'static str {
        match self {
            SettingToggle::Passcode => "passcode_enabled",
            SettingToggle::FaceRecognition => "face_recognition_enabled",
            SettingToggle::Fingerprint => "fingerprint_enabled",
        }
    }
}

/// Repository trait for the settings singleton.
pub trait SettingsRepository: Send + Sync {
    /// Make sure the singleton row exists.
    async fn ensure(&self) -> StorageResult<()>;

    /// Read the full row (creating it first if missing).
    async fn get_row(&self) -> StorageResult<SettingsRow>;

    /// Update the auto-close hold time, clamped at zero.
    async fn update_hold_time(&self, seconds: i64) -> StorageResult<()>;

    /// Flip a feature toggle.
    async fn set_toggle(&self, toggle: SettingToggle, enabled: bool) -> StorageResult<()>;

    /// Record the last observed door state (`"open"` / `"close"`).
    async fn write_door_state(&self, state: &str) -> StorageResult<()>;
}

/// SQLite implementation of [`SettingsRepository`].
#[derive(Debug, Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SettingsRepository for SqliteSettingsRepository {
    async fn ensure(&self) -> StorageResult<()> {
        sqlx::query("INSERT OR IGNORE INTO settings (id) VALUES (?)")
            .bind(SETTINGS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_row(&self) -> StorageResult<SettingsRow> {
        self.ensure().await?;
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT id, passcode_enabled, face_recognition_enabled,
                   fingerprint_enabled, hold_time, door_state
            FROM settings WHERE id = ?
            "#,
        )
        .bind(SETTINGS_ID)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_hold_time(&self, seconds: i64) -> StorageResult<()> {
        self.ensure().await?;
        sqlx::query("UPDATE settings SET hold_time = ? WHERE id = ?")
            .bind(seconds.max(0))
            .bind(SETTINGS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_toggle(&self, toggle: SettingToggle, enabled: bool) -> StorageResult<()> {
        self.ensure().await?;
        let sql = format!("UPDATE settings SET {} = ? WHERE id = ?", toggle.column());
        sqlx::query(&sql)
            .bind(enabled)
            .bind(SETTINGS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn write_door_state(&self, state: &str) -> StorageResult<()> {
        self.ensure().await?;
        sqlx::query("UPDATE settings SET door_state = ? WHERE id = ?")
            .bind(state)
            .bind(SETTINGS_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// The production settings source handed to the core.
impl SettingsSource for SqliteSettingsRepository {
    async fn get(&self) -> CoreResult<Settings> {
        Ok(self.get_row().await?.to_settings())
    }

    async fn set_door_state(&self, state: &str) -> CoreResult<()> {
        Ok(self.write_door_state(state).await?)
    }
}
