//! Line-oriented wire vocabulary spoken with the embedded door controller.
//!
//! The microcontroller multiplexes several logical protocols over one text
//! stream: unsolicited status lines (door motion, keypad entry, fingerprint
//! verdicts), and request/response exchanges used by fingerprint
//! provisioning. This crate owns both directions of that vocabulary:
//!
//! - [`LineEvent`] — classification of inbound lines
//! - [`Command`] — rendering of outbound command lines
//! - [`provisioning`] — reply predicates for the synchronous operations
//!
//! Parsing is substring/prefix based on purpose: the firmware decorates
//! status lines with free text (`"Inform door opening manual"`), so matching
//! keys on the stable fragment and ignores the rest.

pub mod commands;
pub mod events;
pub mod provisioning;

pub use commands::Command;
pub use events::LineEvent;
pub use provisioning::{ProvisioningOp, ReplyMatch};
