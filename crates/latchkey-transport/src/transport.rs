//! Line transport: reader loop, dispatch channel, fail-soft sends.

use crate::detect::{auto_detect_port, clean_port_value, wants_auto_detect};
use crate::link::{LinkReader, LinkWriter, open_serial_link};
use bytes::{BufMut, BytesMut};
use latchkey_core::constants::{DEFAULT_BAUD, DEFAULT_LINE_DENYLIST, PORT_AUTO};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Guard against a stream that never sends a newline.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Transport configuration.
///
/// `port` may be a device path, empty, or the `AUTO` sentinel; the last two
/// trigger auto-detection. Everything else has workable defaults.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Device path, empty, or `AUTO`.
    pub port: String,

    /// Line speed; the firmware's USB console runs at 57600.
    pub baud: u32,

    /// Device read timeout: the reader's idle heartbeat, which bounds how
    /// long `close()` can take to be observed.
    pub read_timeout: Duration,

    /// Pause after a device-level read error before retrying.
    pub error_backoff: Duration,

    /// Lines containing any of these fragments are dropped before dispatch.
    pub denylist: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: PORT_AUTO.to_string(),
            baud: DEFAULT_BAUD,
            read_timeout: Duration::from_millis(100),
            error_backoff: Duration::from_millis(200),
            denylist: DEFAULT_LINE_DENYLIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl TransportConfig {
    /// Config for an explicit port at the given baud rate.
    #[must_use]
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            ..Default::default()
        }
    }
}

/// One accepted inbound line, in arrival order.
///
/// Produced only by the transport; consumed exactly once by the dispatcher,
/// which fans it out to listeners by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialLine {
    /// Arrival order among accepted lines, starting at 0.
    pub seq: u64,

    /// Line content, CR/LF stripped and trimmed.
    pub text: String,
}

struct Inner {
    connected: bool,
    running: AtomicBool,
    writer: Mutex<Option<Box<dyn LinkWriter>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Best-effort line delivery over a serial device.
///
/// Cheap to clone; all clones share the device. See the crate docs for the
/// delivery architecture.
///
/// # Disconnected mode
///
/// When no device can be resolved or opened, the transport still constructs
/// (`is_connected()` reports `false`): every `send` becomes a no-op and the
/// dispatcher's receiver yields nothing. Nothing in the system needs to
/// special-case absent hardware.
#[derive(Clone)]
pub struct LineTransport {
    inner: Arc<Inner>,
}

impl LineTransport {
    /// Open the transport, resolving the port from `config`.
    ///
    /// Returns the transport plus the single dispatcher's line receiver.
    /// Never fails: any resolution or open problem degrades to disconnected
    /// mode with a warning.
    #[must_use]
    pub fn open(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<SerialLine>) {
        let cleaned = clean_port_value(&config.port);
        let port = if wants_auto_detect(&cleaned) {
            auto_detect_port()
        } else {
            Some(cleaned)
        };

        let Some(port) = port else {
            warn!("no serial port found; transport disconnected");
            return Self::disconnected();
        };

        match open_serial_link(&port, config.baud, config.read_timeout) {
            Ok((reader, writer)) => Self::open_with_link(reader, writer, config),
            Err(e) => {
                warn!(port = %port, error = %e, "serial open failed; transport disconnected");
                Self::disconnected()
            }
        }
    }

    /// Open over an already-constructed link (mock or preopened device).
    #[must_use]
    pub fn open_with_link(
        reader: Box<dyn LinkReader>,
        writer: Box<dyn LinkWriter>,
        config: TransportConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SerialLine>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            connected: true,
            running: AtomicBool::new(true),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(None),
        });

        let thread_inner = Arc::clone(&inner);
        let denylist = config.denylist.clone();
        let backoff = config.error_backoff;
        let handle = std::thread::Builder::new()
            .name("latchkey-serial-rx".into())
            .spawn(move || run_reader(reader, tx, &thread_inner.running, &denylist, backoff))
            .expect("spawn serial reader thread");

        *inner.reader.lock().unwrap() = Some(handle);

        (Self { inner }, rx)
    }

    /// A transport with no device: sends no-op, the receiver stays silent.
    #[must_use]
    pub fn disconnected() -> (Self, mpsc::UnboundedReceiver<SerialLine>) {
        // The sender is dropped immediately, so the dispatcher observes a
        // stream that ends without ever yielding.
        let (_tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            connected: false,
            running: AtomicBool::new(false),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        });
        (Self { inner }, rx)
    }

    /// Whether a device was opened and the transport has not been closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected && self.inner.running.load(Ordering::Relaxed)
    }

    /// Send one line, newline appended.
    ///
    /// Silently ignored when disconnected or mid-shutdown; write errors are
    /// logged and swallowed.
    pub fn send(&self, text: &str) {
        if !self.is_connected() {
            trace!(line = text, "send dropped: transport not connected");
            return;
        }

        let mut guard = self.inner.writer.lock().unwrap();
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let mut line = text.trim().to_string();
        line.push('\n');
        match writer.write_all_bytes(line.as_bytes()) {
            Ok(()) => trace!(line = text, "sent"),
            Err(e) => warn!(line = text, error = %e, "serial write failed"),
        }
    }

    /// Stop the reader loop and release the device. Idempotent.
    pub fn close(&self) {
        self.inner.running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.inner.reader.lock().unwrap().take()
            && let Err(e) = handle.join()
        {
            warn!(?e, "serial reader thread panicked");
        }

        self.inner.writer.lock().unwrap().take();
        debug!("transport closed");
    }
}

/// Reader loop: accumulate bytes into lines, filter, deliver.
fn run_reader(
    mut link: Box<dyn LinkReader>,
    tx: mpsc::UnboundedSender<SerialLine>,
    running: &AtomicBool,
    denylist: &[String],
    backoff: Duration,
) {
    let mut acc = BytesMut::with_capacity(1024);
    let mut buf = [0u8; 256];
    let mut seq = 0u64;

    while running.load(Ordering::Relaxed) {
        let n = match link.read_chunk(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "serial read error; backing off");
                std::thread::sleep(backoff);
                continue;
            }
        };

        for &byte in &buf[..n] {
            if byte != b'\n' {
                if acc.len() >= MAX_LINE_BYTES {
                    warn!("line overflow; discarding buffer");
                    acc.clear();
                }
                acc.put_u8(byte);
                continue;
            }

            let text = String::from_utf8_lossy(&acc).trim().to_string();
            acc.clear();

            if text.is_empty() {
                continue;
            }
            if denylist.iter().any(|noise| text.contains(noise.as_str())) {
                trace!(line = %text, "denylisted line dropped");
                continue;
            }

            let line = SerialLine { seq, text };
            seq += 1;
            if tx.send(line).is_err() {
                // Dispatcher gone; nothing left to deliver to.
                return;
            }
        }
    }
}
