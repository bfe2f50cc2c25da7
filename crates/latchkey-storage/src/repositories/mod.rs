pub mod access_log;
pub mod fingerprint;
pub mod passcode;
pub mod settings;

pub use access_log::{AccessLogRepository, SqliteAccessLogRepository};
pub use fingerprint::{FingerprintRepository, SqliteFingerprintRepository};
pub use passcode::{PasscodeRepository, SqlitePasscodeRepository};
pub use settings::{SettingToggle, SettingsRepository, SqliteSettingsRepository};
