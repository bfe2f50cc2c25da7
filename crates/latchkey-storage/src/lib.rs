//! Storage layer for the latchkey access-control system.
//!
//! SQLite-backed persistence for passcodes, runtime settings, the access
//! audit log, and the fingerprint roster, plus the production
//! implementations of the collaborator interfaces the core consumes
//! ([`latchkey_core::CredentialStore`], [`latchkey_core::AccessLog`],
//! [`latchkey_core::SettingsSource`]).
//!
//! # Architecture
//!
//! Repository pattern throughout: each entity has a trait plus a
//! `Sqlite*Repository` implementation over a shared [`Database`] pool.
//! Traits keep the core testable against in-memory fakes; the SQLite
//! implementations are what the wiring binary hands to the controller.
//!
//! Passcodes are stored as a SHA-256 hash for verification plus a display
//! form for the management surface. Encryption at rest is deliberately not
//! handled here.

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{AccessLogRow, FingerprintRow, PasscodeRow, SettingsRow};
pub use repositories::{
    AccessLogRepository, FingerprintRepository, PasscodeRepository, SettingToggle,
    SettingsRepository, SqliteAccessLogRepository, SqliteFingerprintRepository,
    SqlitePasscodeRepository, SqliteSettingsRepository,
};
