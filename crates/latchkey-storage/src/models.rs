//! Row models for the latchkey schema.

use chrono::{DateTime, Utc};
use latchkey_core::Credential;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored passcode (main or guest).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PasscodeRow {
    pub id: i64,
    pub code_hash: String,

    /// Display form of the code (kept readable for the management surface).
    pub code_masked: String,

    pub is_main: bool,
    pub is_one_time: bool,
    pub used: bool,
    pub valid_until: Option<DateTime<Utc>>,
}

impl PasscodeRow {
    /// Project onto the credential record the verification pipeline reads.
    #[must_use]
    pub fn to_credential(&self) -> Credential {
        Credential {
            id: self.id,
            masked: self.code_masked.clone(),
            is_main: self.is_main,
            is_one_time: self.is_one_time,
            used: self.used,
            valid_until: self.valid_until,
        }
    }
}

/// One recorded access attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccessLogRow {
    pub id: i64,
    pub method: String,
    pub result: String,
    pub passcode_masked: Option<String>,
    pub passcode_hash: Option<String>,
    pub confidence: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// The singleton settings row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettingsRow {
    pub id: i64,
    pub passcode_enabled: bool,
    pub face_recognition_enabled: bool,
    pub fingerprint_enabled: bool,
    pub hold_time: i64,
    pub door_state: String,
}

impl SettingsRow {
    /// Snapshot consumed by the core.
    #[must_use]
    pub fn to_settings(&self) -> latchkey_core::Settings {
        latchkey_core::Settings {
            passcode_enabled: self.passcode_enabled,
            face_enabled: self.face_recognition_enabled,
            fingerprint_enabled: self.fingerprint_enabled,
            hold_time_secs: self.hold_time.max(0) as u64,
        }
    }
}

/// Local roster entry mapping a sensor slot to a display name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FingerprintRow {
    /// Sensor slot id.
    pub id: i64,
    pub name: String,
}
