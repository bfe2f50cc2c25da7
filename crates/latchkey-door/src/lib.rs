//! Door protocol state machine and controller.
//!
//! This crate is the center of the access-control core: it owns
//! [`DoorState`], interprets the inbound line stream, issues commands,
//! manages the auto-close timer, and runs the passcode verification
//! pipeline against injected collaborator interfaces.

pub mod controller;
pub mod state;

pub use controller::{DoorController, LineCallback};
pub use state::{DoorEvent, DoorState};
