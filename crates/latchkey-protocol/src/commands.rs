//! Outbound command vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A command line sent to the embedded controller.
///
/// Commands are fire-and-forget: the controller never waits for an
/// acknowledgement of an open/close; state changes are driven only by the
/// subsequent inbound status lines.
///
/// # Examples
///
/// ```
/// use latchkey_protocol::Command;
///
/// assert_eq!(Command::OpenPasscode.to_string(), "open passcode");
/// assert_eq!(Command::Delete(3).to_string(), "delete 3");
/// assert_eq!(Command::DeleteAll.to_string(), "delete all");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Open via the operator surface.
    OpenManual,

    /// Open after a confirmed face match.
    OpenFace,

    /// Open after a verified keypad code.
    OpenPasscode,

    /// Close the door.
    Close,

    /// Start fingerprint enrollment on the sensor.
    Enroll,

    /// Delete one fingerprint template by sensor slot id.
    Delete(u32),

    /// Delete every fingerprint template.
    DeleteAll,

    /// Query the first empty fingerprint slot.
    Library,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::OpenManual => write!(f, "open manual"),
            Command::OpenFace => write!(f, "open face"),
            Command::OpenPasscode => write!(f, "open passcode"),
            Command::Close => write!(f, "close"),
            Command::Enroll => write!(f, "enroll"),
            Command::Delete(slot) => write!(f, "delete {slot}"),
            Command::DeleteAll => write!(f, "delete all"),
            Command::Library => write!(f, "library"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Command::OpenManual, "open manual")]
    #[case(Command::OpenFace, "open face")]
    #[case(Command::OpenPasscode, "open passcode")]
    #[case(Command::Close, "close")]
    #[case(Command::Enroll, "enroll")]
    #[case(Command::Delete(17), "delete 17")]
    #[case(Command::DeleteAll, "delete all")]
    #[case(Command::Library, "library")]
    fn test_wire_form(#[case] command: Command, #[case] expected: &str) {
        assert_eq!(command.to_string(), expected);
    }
}
