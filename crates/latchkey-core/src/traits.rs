//! Collaborator interfaces consumed by the access-control core.
//!
//! The controller and scheduler never look these up dynamically; they are
//! passed in at construction as interface-typed collaborators. Storage
//! provides the production implementations; tests provide in-memory ones.
//!
//! Methods are declared in return-position `impl Future + Send` form rather
//! than bare `async fn` (Edition 2024 RPITIT): the futures cross
//! `tokio::spawn`, so their `Send` bound must be part of the contract.
//! Implementations still write plain `async fn`.

use crate::Result;
use crate::types::{AccessAttempt, Credential, Settings};
use std::future::Future;

/// Read/verify access to stored passcodes.
///
/// The core reads and asks for exactly one mutation: marking a one-time
/// credential used on its first successful match.
pub trait CredentialStore: Send + Sync {
    /// Check an entered code against the main credential.
    fn verify_main(&self, code: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Currently active guest credentials, in store order.
    ///
    /// "Active" means unexpired and, for one-time codes, unused. The
    /// returned order is the verification order; first match wins.
    fn list_active_guests(&self) -> impl Future<Output = Result<Vec<Credential>>> + Send;

    /// Plaintext of the main credential, or empty when unavailable.
    fn reveal_main(&self) -> impl Future<Output = Result<String>> + Send;

    /// Plaintext of a guest credential, or empty when unavailable.
    fn reveal_guest(&self, id: i64) -> impl Future<Output = Result<String>> + Send;

    /// Flip a one-time credential to used. Must be idempotent.
    fn mark_used(&self, id: i64) -> impl Future<Output = Result<()>> + Send;
}

/// Audit log sink. One record per completed verification attempt.
pub trait AccessLog: Send + Sync {
    fn record(&self, attempt: AccessAttempt) -> impl Future<Output = Result<()>> + Send;
}

/// Runtime settings the core re-reads rather than caches.
pub trait SettingsSource: Send + Sync {
    /// Current settings snapshot.
    fn get(&self) -> impl Future<Output = Result<Settings>> + Send;

    /// Record the last observed door state (`"open"` or `"close"`).
    ///
    /// Best-effort; callers ignore failures.
    fn set_door_state(&self, state: &str) -> impl Future<Output = Result<()>> + Send;
}
