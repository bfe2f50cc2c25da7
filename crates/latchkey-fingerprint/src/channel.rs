//! Bounded request/response channel over the shared line stream.

use latchkey_protocol::ProvisioningOp;
use latchkey_transport::{LineTransport, SerialLine};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

/// Recently dispatched lines kept for reply matching.
const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Gap between queue polls while waiting for a reply.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

type Observer = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of one provisioning operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub ok: bool,

    /// Extracted trailing numeric field (enrolled slot, first empty slot).
    pub value: Option<u32>,

    /// Human-readable result: a friendly success phrase, the matched error
    /// line, `"timeout"`, or `"Serial not connected"`.
    pub message: String,
}

impl ProvisionOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            message: message.into(),
        }
    }
}

/// A bounded, oldest-evicted queue of lines with deadline-polled matching.
///
/// The queue is fed by a listener registered on the door controller's
/// fan-out; operations drain stale lines, send their command, then poll
/// newly arrived lines against the operation's reply predicates.
///
/// Cheap to clone; clones share the queue and the in-flight lock.
#[derive(Clone)]
pub struct CommandChannel {
    transport: LineTransport,
    queue: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
    observer: Arc<Mutex<Option<Observer>>>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl CommandChannel {
    /// Channel over `transport` with the default queue capacity.
    #[must_use]
    pub fn new(transport: LineTransport) -> Self {
        Self::with_capacity(transport, DEFAULT_QUEUE_CAPACITY)
    }

    /// Channel with an explicit queue capacity (oldest lines evicted).
    #[must_use]
    pub fn with_capacity(transport: LineTransport, capacity: usize) -> Self {
        Self {
            transport,
            queue: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
            observer: Arc::new(Mutex::new(None)),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Whether the underlying transport has a device.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Forward every observed line to `observer` (UI echo).
    ///
    /// Observation never alters match outcomes; the observer runs at
    /// ingestion, before any predicate sees the line.
    pub fn set_observer(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Arc::new(observer));
    }

    /// The listener to register on the dispatcher's fan-out
    /// (`controller.add_listener(channel.listener())`).
    #[must_use]
    pub fn listener(&self) -> impl Fn(&SerialLine) + Send + Sync + use<> {
        let queue = Arc::clone(&self.queue);
        let observer = Arc::clone(&self.observer);
        let capacity = self.capacity;
        move |line: &SerialLine| {
            if let Some(observer) = observer.lock().unwrap().clone() {
                observer(&line.text);
            }
            let mut queue = queue.lock().unwrap();
            if queue.len() >= capacity {
                queue.pop_front();
            }
            queue.push_back(line.text.clone());
        }
    }

    /// Run one synchronous operation: drain, send, poll until a predicate
    /// matches or `timeout` elapses.
    ///
    /// Lines that match neither predicate are consumed and discarded; they
    /// were already fanned out to other listeners by the dispatcher.
    pub async fn execute(
        &self,
        command: &str,
        op: ProvisioningOp,
        timeout: Duration,
    ) -> ProvisionOutcome {
        if !self.is_connected() {
            return ProvisionOutcome::failure("Serial not connected");
        }

        let _guard = self.in_flight.lock().await;

        self.drain();
        debug!(command, "provisioning command sent");
        self.transport.send(command);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            while let Some(line) = self.pop() {
                trace!(line = %line, "provisioning reply candidate");
                if let Some(reply) = op.classify(&line) {
                    return ProvisionOutcome {
                        ok: reply.ok,
                        value: reply.value,
                        message: reply.message,
                    };
                }
            }

            if tokio::time::Instant::now() >= deadline {
                debug!(command, "provisioning timed out");
                return ProvisionOutcome::failure("timeout");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Discard every stale line left over from a previous operation.
    fn drain(&self) {
        self.queue.lock().unwrap().clear();
    }

    fn pop(&self) -> Option<String> {
        self.queue.lock().unwrap().pop_front()
    }

    #[cfg(test)]
    fn queued(&self) -> Vec<String> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_transport::{MockLink, MockLinkHandle, TransportConfig};

    fn connected_channel() -> (CommandChannel, MockLinkHandle) {
        let (reader, writer, handle) = MockLink::new();
        let (transport, _rx) =
            LineTransport::open_with_link(reader, writer, TransportConfig::default());
        (CommandChannel::new(transport), handle)
    }

    fn feed(channel: &CommandChannel, text: &str) {
        channel.listener()(&SerialLine {
            seq: 0,
            text: text.to_string(),
        });
    }

    #[tokio::test(start_paused = true)]
    async fn matches_reply_that_arrives_after_send() {
        let (channel, link) = connected_channel();

        let feeder = {
            let channel = channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                feed(&channel, "Inform enroll complete, ID:3");
            })
        };

        let outcome = channel
            .execute("enroll", ProvisioningOp::Enroll, Duration::from_secs(8))
            .await;
        feeder.await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.value, Some(3));
        assert_eq!(link.sent_lines(), vec!["enroll"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_lines_cannot_satisfy_a_new_operation() {
        let (channel, _link) = connected_channel();

        // A success reply from some earlier exchange is still queued.
        feed(&channel, "Inform enroll complete, ID:3");

        let outcome = channel
            .execute("enroll", ProvisioningOp::Enroll, Duration::from_millis(200))
            .await;

        // The stale line was drained before the send; nothing matched.
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reply_returns_the_line() {
        let (channel, _link) = connected_channel();

        let feeder = {
            let channel = channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                feed(&channel, "Error delete: no such id");
            })
        };

        let outcome = channel
            .execute("delete 9", ProvisioningOp::Delete, Duration::from_secs(3))
            .await;
        feeder.await.unwrap();

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Error delete: no such id");
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_lines_are_consumed_not_matched() {
        let (channel, _link) = connected_channel();

        let feeder = {
            let channel = channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                feed(&channel, "Inform door opened");
                feed(&channel, "Inform library first empty slot: 5");
            })
        };

        let outcome = channel
            .execute("library", ProvisioningOp::Library, Duration::from_secs(3))
            .await;
        feeder.await.unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.value, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_fails_immediately() {
        let (transport, _rx) = LineTransport::disconnected();
        let channel = CommandChannel::new(transport);

        let before = tokio::time::Instant::now();
        let outcome = channel
            .execute("enroll", ProvisioningOp::Enroll, Duration::from_secs(8))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Serial not connected");
        // No waiting for the full timeout.
        assert_eq!(tokio::time::Instant::now(), before);
    }

    #[tokio::test]
    async fn queue_evicts_oldest_beyond_capacity() {
        let (reader, writer, _handle) = MockLink::new();
        let (transport, _rx) =
            LineTransport::open_with_link(reader, writer, TransportConfig::default());
        let channel = CommandChannel::with_capacity(transport, 3);

        for i in 0..5 {
            feed(&channel, &format!("line {i}"));
        }

        assert_eq!(channel.queued(), vec!["line 2", "line 3", "line 4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_lines_without_changing_outcome() {
        let (channel, _link) = connected_channel();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_observer = Arc::clone(&seen);
        channel.set_observer(move |line| {
            seen_in_observer.lock().unwrap().push(line.to_string());
        });

        let feeder = {
            let channel = channel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                feed(&channel, "noise");
                feed(&channel, "Inform delete success");
            })
        };

        let outcome = channel
            .execute("delete all", ProvisioningOp::Delete, Duration::from_secs(8))
            .await;
        feeder.await.unwrap();

        assert!(outcome.ok);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &["noise", "Inform delete success"]
        );
    }
}
