//! Object-safe byte-level link abstraction.
//!
//! The transport reads and writes through these small traits instead of a
//! concrete `serialport` handle so the same reader loop runs against real
//! hardware and against the in-memory [`crate::MockLink`] in tests. The
//! surface is deliberately synchronous: the `serialport` crate is blocking
//! and the reader owns a dedicated thread anyway.

use crate::error::{TransportError, TransportResult};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::info;

/// Reading half of a duplex byte link.
pub trait LinkReader: Send {
    /// Read whatever is available, blocking up to the link's read timeout.
    ///
    /// Returns `Ok(0)` on timeout with nothing available — timeouts are the
    /// reader loop's idle heartbeat, not errors.
    ///
    /// # Errors
    /// Returns an error on device-level failures (unplugged adapter,
    /// revoked handle). The reader loop backs off and retries.
    fn read_chunk(&mut self, buf: &mut [u8]) -> TransportResult<usize>;
}

/// Writing half of a duplex byte link.
pub trait LinkWriter: Send {
    /// Write the full buffer.
    ///
    /// # Errors
    /// Returns an error on device-level failures; the transport logs and
    /// swallows these per its fail-soft contract.
    fn write_all_bytes(&mut self, bytes: &[u8]) -> TransportResult<()>;
}

/// Open a real serial device and split it into reader/writer halves.
///
/// The two halves are independent clones of the same OS handle, so the
/// reader thread and senders never contend on a lock around the device.
///
/// # Errors
/// Returns `TransportError::Open` if the device cannot be opened or the
/// handle cannot be cloned.
pub fn open_serial_link(
    port: &str,
    baud: u32,
    read_timeout: Duration,
) -> TransportResult<(Box<dyn LinkReader>, Box<dyn LinkWriter>)> {
    let reader = serialport::new(port, baud)
        .timeout(read_timeout)
        .open()
        .map_err(|e| TransportError::Open {
            port: port.to_string(),
            message: e.to_string(),
        })?;

    let writer = reader.try_clone().map_err(|e| TransportError::Open {
        port: port.to_string(),
        message: format!("clone for writer: {e}"),
    })?;

    info!(port, baud, "serial link open");

    Ok((
        Box::new(SerialPortReader { port: reader }),
        Box::new(SerialPortWriter { port: writer }),
    ))
}

struct SerialPortReader {
    port: Box<dyn serialport::SerialPort>,
}

impl LinkReader for SerialPortReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // Timeout means "nothing arrived"; WouldBlock shows up on some
            // platforms for the same condition.
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

struct SerialPortWriter {
    port: Box<dyn serialport::SerialPort>,
}

impl LinkWriter for SerialPortWriter {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.port.write_all(bytes)?;
        Ok(())
    }
}
