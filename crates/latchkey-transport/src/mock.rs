//! In-memory link for testing and development.
//!
//! `MockLink` stands in for the serial device: tests feed inbound bytes
//! through a cloneable handle and observe everything the transport wrote,
//! without hardware.

use crate::error::TransportResult;
use crate::link::{LinkReader, LinkWriter};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory duplex link controlled by a [`MockLinkHandle`].
///
/// # Examples
///
/// ```
/// use latchkey_transport::MockLink;
///
/// let (reader, writer, handle) = MockLink::new();
/// handle.feed_line("Inform door opened");
/// // hand `reader`/`writer` to LineTransport::open_with_link(...)
/// # let _ = (reader, writer);
/// ```
pub struct MockLink;

impl MockLink {
    /// Create the reader half, writer half and controlling handle.
    #[must_use]
    pub fn new() -> (Box<dyn LinkReader>, Box<dyn LinkWriter>, MockLinkHandle) {
        let (byte_tx, byte_rx) = mpsc::channel::<Vec<u8>>();
        let written = Arc::new(Mutex::new(Vec::new()));

        let reader = Box::new(MockReader {
            rx: byte_rx,
            pending: Vec::new(),
        });
        let writer = Box::new(MockWriter {
            written: Arc::clone(&written),
        });
        let handle = MockLinkHandle { byte_tx, written };

        (reader, writer, handle)
    }
}

struct MockReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl LinkReader for MockReader {
    fn read_chunk(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(bytes) => self.pending = bytes,
                // Timeout mirrors an idle device; a dropped handle reads as
                // a permanently idle one.
                Err(_) => return Ok(0),
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct MockWriter {
    written: Arc<Mutex<Vec<u8>>>,
}

impl LinkWriter for MockWriter {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> TransportResult<()> {
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

/// Cloneable control handle for a [`MockLink`].
#[derive(Clone)]
pub struct MockLinkHandle {
    byte_tx: mpsc::Sender<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl MockLinkHandle {
    /// Feed raw inbound bytes, exactly as the device would emit them.
    pub fn feed_bytes(&self, bytes: &[u8]) {
        // Ignore send failures: the transport may already be closed.
        let _ = self.byte_tx.send(bytes.to_vec());
    }

    /// Feed one inbound line, newline appended.
    pub fn feed_line(&self, line: &str) {
        self.feed_bytes(format!("{line}\n").as_bytes());
    }

    /// Everything written to the link so far, split into lines.
    #[must_use]
    pub fn sent_lines(&self) -> Vec<String> {
        let bytes = self.written.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::to_string)
            .collect()
    }
}
