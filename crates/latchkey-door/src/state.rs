//! Door state machine.
//!
//! The physical door cycles Closed → Opening → OpenHold → Closing → Closed.
//! State is owned exclusively by the controller and driven only by inbound
//! status lines — sending an open command changes nothing until the device
//! reports motion. The transition table below describes the nominal cycle;
//! the device is the source of truth, so the controller applies whatever the
//! line says and merely logs departures from the table (a door can reverse
//! mid-close when someone reopens it).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the door is in its open/close cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    /// Fully closed. Initial state.
    Closed,

    /// Motor running toward open.
    Opening,

    /// Fully open, auto-close timer running (when hold time > 0).
    OpenHold,

    /// Motor running toward closed.
    Closing,
}

impl DoorState {
    /// Whether `target` is the nominal next state from this one.
    ///
    /// Reversals (`Closing → Opening`) are included: a person in the
    /// doorway retriggers the open path while the door is closing.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_door::DoorState;
    ///
    /// assert!(DoorState::Closed.can_transition_to(DoorState::Opening));
    /// assert!(DoorState::Closing.can_transition_to(DoorState::Opening));
    /// assert!(!DoorState::Closed.can_transition_to(DoorState::Closing));
    /// ```
    #[must_use]
    pub fn can_transition_to(self, target: DoorState) -> bool {
        matches!(
            (self, target),
            (DoorState::Closed, DoorState::Opening)
                | (DoorState::Opening, DoorState::OpenHold)
                | (DoorState::OpenHold, DoorState::Closing)
                | (DoorState::Closing, DoorState::Closed | DoorState::Opening)
        )
    }

    /// Whether the door is somewhere in its motion/open cycle.
    #[must_use]
    pub fn is_busy(self) -> bool {
        !matches!(self, DoorState::Closed)
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DoorState::Closed => "Closed",
            DoorState::Opening => "Opening",
            DoorState::OpenHold => "OpenHold",
            DoorState::Closing => "Closing",
        };
        write!(f, "{s}")
    }
}

/// Door lifecycle event re-published by the controller.
///
/// Consumers use these to synchronize with the door: the recognition
/// scheduler pauses on `Opening` and resumes on `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorEvent {
    Opening,
    Opened,
    Closing,
    Closed,
}
