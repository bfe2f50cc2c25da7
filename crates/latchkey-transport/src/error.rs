use thiserror::Error;

/// Errors that can occur inside the transport.
///
/// None of these cross the public API of [`crate::LineTransport`]: open
/// failures collapse into disconnected mode and read/write failures are
/// retried or swallowed, per the fail-soft transport contract.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No serial ports enumerated on this host.
    #[error("No serial ports found")]
    NoPortsFound,

    /// Opening the device failed.
    #[error("Failed to open {port}: {message}")]
    Open { port: String, message: String },

    /// Low-level I/O error on the link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
