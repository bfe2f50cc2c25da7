//! Shared constants for the latchkey access-control core.

/// Keypad passcodes are exactly this many digits.
pub const PASSCODE_LENGTH: usize = 4;

/// Seconds a door stays open before the controller auto-closes it.
pub const DEFAULT_HOLD_TIME_SECS: u64 = 5;

/// Default validity window for newly created guest passcodes.
pub const DEFAULT_GUEST_VALID_MINUTES: i64 = 60;

/// Default baud rate for the embedded controller's USB serial link.
pub const DEFAULT_BAUD: u32 = 57_600;

/// Sentinel port value requesting auto-detection.
pub const PORT_AUTO: &str = "AUTO";

/// USB adapter chip keywords used to score ports during auto-detection.
pub const ADAPTER_KEYWORDS: &[&str] = &["CP210", "CH340"];

/// Noisy status lines dropped by the transport before dispatch.
///
/// The firmware acknowledges every LED update; those acknowledgements carry
/// no information for the host and would flood listeners.
pub const DEFAULT_LINE_DENYLIST: &[&str] = &["LED set success"];
