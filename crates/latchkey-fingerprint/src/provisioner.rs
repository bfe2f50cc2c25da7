//! High-level fingerprint provisioning operations.

use crate::channel::{CommandChannel, ProvisionOutcome};
use latchkey_protocol::{Command, ProvisioningOp};
use std::time::Duration;
use tracing::info;

/// Per-operation reply deadlines.
///
/// Enrollment waits on a human pressing a finger twice, so it gets the
/// longest window; deletes and queries answer at firmware speed. These are
/// configuration, not protocol constants.
#[derive(Debug, Clone, Copy)]
pub struct ProvisioningTimeouts {
    pub enroll: Duration,
    pub delete: Duration,
    pub delete_all: Duration,
    pub library: Duration,
}

impl Default for ProvisioningTimeouts {
    fn default() -> Self {
        Self {
            enroll: Duration::from_secs(8),
            delete: Duration::from_secs(3),
            delete_all: Duration::from_secs(8),
            library: Duration::from_secs(3),
        }
    }
}

/// Fingerprint sensor provisioning over a [`CommandChannel`].
///
/// Operations return a [`ProvisionOutcome`] rather than erroring: a
/// disconnected transport, a firmware error line and a timeout are all
/// ordinary results the caller shows the operator.
pub struct FingerprintProvisioner {
    channel: CommandChannel,
    timeouts: ProvisioningTimeouts,
}

impl FingerprintProvisioner {
    #[must_use]
    pub fn new(channel: CommandChannel) -> Self {
        Self::with_timeouts(channel, ProvisioningTimeouts::default())
    }

    #[must_use]
    pub fn with_timeouts(channel: CommandChannel, timeouts: ProvisioningTimeouts) -> Self {
        Self { channel, timeouts }
    }

    /// Whether the underlying transport has a device.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Start enrollment on the sensor; on success `value` is the slot id
    /// the template landed in.
    pub async fn enroll(&self) -> ProvisionOutcome {
        let outcome = self
            .channel
            .execute(
                &Command::Enroll.to_string(),
                ProvisioningOp::Enroll,
                self.timeouts.enroll,
            )
            .await;
        if outcome.ok {
            info!(slot = ?outcome.value, "fingerprint enrolled");
            return ProvisionOutcome {
                message: "enroll complete".into(),
                ..outcome
            };
        }
        outcome
    }

    /// Delete one template by sensor slot id.
    pub async fn delete(&self, slot: u32) -> ProvisionOutcome {
        let outcome = self
            .channel
            .execute(
                &Command::Delete(slot).to_string(),
                ProvisioningOp::Delete,
                self.timeouts.delete,
            )
            .await;
        if outcome.ok {
            info!(slot, "fingerprint deleted");
            return ProvisionOutcome {
                message: "deleted".into(),
                ..outcome
            };
        }
        outcome
    }

    /// Delete every template on the sensor.
    pub async fn delete_all(&self) -> ProvisionOutcome {
        let outcome = self
            .channel
            .execute(
                &Command::DeleteAll.to_string(),
                ProvisioningOp::Delete,
                self.timeouts.delete_all,
            )
            .await;
        if outcome.ok {
            info!("all fingerprints deleted");
            return ProvisionOutcome {
                message: "all deleted".into(),
                ..outcome
            };
        }
        outcome
    }

    /// Ask the sensor for its first empty template slot.
    pub async fn first_empty_slot(&self) -> ProvisionOutcome {
        let outcome = self
            .channel
            .execute(
                &Command::Library.to_string(),
                ProvisioningOp::Library,
                self.timeouts.library,
            )
            .await;
        if outcome.ok {
            return ProvisionOutcome {
                message: "ok".into(),
                ..outcome
            };
        }
        outcome
    }
}
