//! Serial line transport for the embedded door controller.
//!
//! This crate turns the controller's USB serial byte stream into discrete
//! text lines and delivers them to exactly one dispatcher. It degrades to a
//! disconnected no-op mode when no device can be found or opened, so the
//! rest of the system runs and tests without hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  bytes   ┌───────────────┐  SerialLine   ┌────────────┐
//! │ serial     │─────────►│ reader thread  │──────────────►│ dispatcher │
//! │ device     │          │ (line split,   │  (unbounded   │ (one       │
//! │            │◄─────────│  denylist)     │   channel)    │  consumer) │
//! └────────────┘  send()  └───────────────┘               └────────────┘
//! ```
//!
//! The reader runs on a dedicated OS thread because the `serialport` crate
//! is blocking; lines cross into the async world over an unbounded channel,
//! so a slow dispatcher can never stall the device read.

pub mod detect;
pub mod error;
pub mod link;
pub mod mock;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use link::{LinkReader, LinkWriter, open_serial_link};
pub use mock::{MockLink, MockLinkHandle};
pub use transport::{LineTransport, SerialLine, TransportConfig};
