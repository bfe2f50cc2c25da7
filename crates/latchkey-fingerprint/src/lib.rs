//! Fingerprint provisioning over the shared serial line.
//!
//! The transport is purely asynchronous and shared with the door protocol;
//! this crate layers a bounded, time-boxed request/response channel on top
//! of it so short-lived provisioning operations (enroll, delete, slot
//! query) can be called as plain awaited functions.
//!
//! Only one operation may be in flight at a time; the channel enforces the
//! single-operator assumption with an internal async lock. Never call these
//! operations from the transport's own dispatch path — they wait on lines
//! that path delivers.

pub mod channel;
pub mod provisioner;

pub use channel::{CommandChannel, ProvisionOutcome};
pub use provisioner::{FingerprintProvisioner, ProvisioningTimeouts};
