pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{AccessLog, CredentialStore, SettingsSource};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
