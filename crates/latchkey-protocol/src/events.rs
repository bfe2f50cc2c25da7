//! Classification of inbound status lines.

use serde::{Deserialize, Serialize};

/// A recognized inbound line from the embedded controller.
///
/// Classification is ordered: door motion fragments are checked first so a
/// decorated line like `"Inform door opening passcode"` lands on the door
/// event, not on the keypad-entry branch.
///
/// # Examples
///
/// ```
/// use latchkey_protocol::LineEvent;
///
/// assert_eq!(LineEvent::parse("Inform door opened"), LineEvent::DoorOpened);
/// assert_eq!(
///     LineEvent::parse("Inform passcode 1234"),
///     LineEvent::Passcode("1234".to_string())
/// );
/// assert_eq!(
///     LineEvent::parse("Inform finger found, ID:7"),
///     LineEvent::FingerFound { slot: Some(7) }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEvent {
    /// Door motion started.
    DoorOpening,

    /// Door fully open.
    DoorOpened,

    /// Door motion to close started.
    DoorClosing,

    /// Door fully closed.
    DoorClosed,

    /// Keypad-entered code, as typed.
    Passcode(String),

    /// Fingerprint matched on the sensor; the device opens autonomously.
    FingerFound { slot: Option<u32> },

    /// Fingerprint rejected on the sensor.
    FingerNotFound,

    /// Anything else (provisioning replies, debug chatter). Left to
    /// secondary listeners.
    Unrecognized,
}

impl LineEvent {
    /// Classify one inbound line. Infallible; unknown lines are
    /// [`LineEvent::Unrecognized`].
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let text = line.trim();

        // Door motion first: these fragments are case-sensitive and may be
        // followed by the triggering channel ("manual", "face", "passcode").
        if text.contains("door opening") {
            return LineEvent::DoorOpening;
        }
        if text.contains("door opened") {
            return LineEvent::DoorOpened;
        }
        if text.contains("door closing") {
            return LineEvent::DoorClosing;
        }
        if text.contains("door closed") {
            return LineEvent::DoorClosed;
        }

        if text.contains("finger not found") {
            return LineEvent::FingerNotFound;
        }
        if text.contains("finger found") {
            return LineEvent::FingerFound {
                slot: extract_slot_id(text),
            };
        }

        if let Some(code) = extract_passcode(text) {
            return LineEvent::Passcode(code);
        }

        LineEvent::Unrecognized
    }
}

/// Pull the entered code out of a keypad line.
///
/// Accepts both `"Inform passcode 1234"` and the bare `"passcode: 1234"`
/// form; the colon after the keyword is optional.
fn extract_passcode(text: &str) -> Option<String> {
    let rest = text
        .strip_prefix("Inform passcode")
        .or_else(|| text.strip_prefix("passcode"))?;
    let code = rest.trim_start().strip_prefix(':').unwrap_or(rest).trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Extract the sensor slot id from a `"finger found, ID:<n>"` line.
///
/// The firmware writes `ID:` but has historically also used `ID <n>`;
/// both separators are accepted.
fn extract_slot_id(text: &str) -> Option<u32> {
    let after = &text[text.find("ID")? + 2..];
    let digits: String = after
        .chars()
        .skip_while(|c| *c == ':' || c.is_whitespace())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
