//! Door protocol controller: the single dispatcher over the line stream.
//!
//! One `DoorController` owns the door's state, interprets every inbound
//! line, issues open/close commands and manages the auto-close timer. Each
//! accepted line flows through three isolated stages, in order:
//!
//! 1. internal logic (state machine, passcode pipeline, fingerprint log)
//! 2. the primary callback given at construction
//! 3. every registered secondary listener, in registration order
//!
//! A fault in any stage is contained to that stage: it cannot stop delivery
//! to later stages and cannot stop the next line from being processed.
//!
//! Commands are fire-and-forget. The controller never blocks on an
//! acknowledgement; door state changes only when the device reports them.

use crate::state::{DoorEvent, DoorState};
use latchkey_core::constants::DEFAULT_HOLD_TIME_SECS;
use latchkey_core::{
    AccessAttempt, AccessLog, AccessMethod, AccessOutcome, Credential, CredentialStore,
    SettingsSource, constant_time_eq,
};
use latchkey_protocol::{Command, LineEvent};
use latchkey_transport::{LineTransport, SerialLine};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Primary line callback, invoked after internal logic and before the
/// secondary listeners.
pub type LineCallback = Box<dyn Fn(&SerialLine) + Send + Sync>;

type Listener = Arc<dyn Fn(&SerialLine) + Send + Sync>;

/// At most one auto-close task is ever outstanding. The generation counter
/// is bumped on every arm and cancel; a sleeping task that wakes to find a
/// newer generation does nothing. Firing checks (and sends) under the same
/// lock that arming and cancelling take, so cancel-then-fire cannot emit a
/// close.
#[derive(Default)]
struct AutoClose {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<DoorState>,
    busy: AtomicBool,
    hold_time: Mutex<Duration>,
    auto_close: Mutex<AutoClose>,
    listeners: Mutex<Vec<Listener>>,
    events: broadcast::Sender<DoorEvent>,
}

/// Handle to a running door controller.
///
/// Cheap to share by reference; state is owned by the dispatch task and
/// mutated only through serialized entry points.
pub struct DoorController {
    shared: Arc<Shared>,
    transport: LineTransport,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl DoorController {
    /// Spawn the dispatch loop over `lines` with the given collaborators.
    ///
    /// Must be called inside a tokio runtime. On startup the dispatch task
    /// reads the settings source once to pick up the configured hold time;
    /// failures keep the default.
    pub fn spawn<S, L, T>(
        transport: LineTransport,
        lines: mpsc::UnboundedReceiver<SerialLine>,
        store: S,
        log: L,
        settings: T,
        primary: Option<LineCallback>,
    ) -> Self
    where
        S: CredentialStore + 'static,
        L: AccessLog + 'static,
        T: SettingsSource + 'static,
    {
        let (events, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            state: Mutex::new(DoorState::Closed),
            busy: AtomicBool::new(false),
            hold_time: Mutex::new(Duration::from_secs(DEFAULT_HOLD_TIME_SECS)),
            auto_close: Mutex::new(AutoClose::default()),
            listeners: Mutex::new(Vec::new()),
            events,
        });

        let dispatcher = Dispatcher {
            shared: Arc::clone(&shared),
            transport: transport.clone(),
            store,
            log,
            settings,
            primary,
        };
        let dispatch = tokio::spawn(dispatcher.run(lines));

        Self {
            shared,
            transport,
            dispatch: Mutex::new(Some(dispatch)),
        }
    }

    /// Whether the underlying transport has a device.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Current door state.
    #[must_use]
    pub fn state(&self) -> DoorState {
        *self.shared.state.lock().unwrap()
    }

    /// Whether the door is in motion or held open.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Relaxed)
    }

    /// Current auto-close hold time.
    #[must_use]
    pub fn hold_time(&self) -> Duration {
        *self.shared.hold_time.lock().unwrap()
    }

    /// Update the hold time at runtime. Negative values clamp to zero;
    /// zero disables auto-close. Applies to timers armed from now on.
    pub fn set_hold_time(&self, seconds: i64) {
        let secs = seconds.max(0) as u64;
        *self.shared.hold_time.lock().unwrap() = Duration::from_secs(secs);
        debug!(secs, "hold time updated");
    }

    /// Open the door via the operator surface.
    pub fn open_door(&self) {
        self.transport.send(&Command::OpenManual.to_string());
    }

    /// Open the door after a confirmed face match.
    pub fn open_face(&self) {
        self.transport.send(&Command::OpenFace.to_string());
    }

    /// Close the door.
    pub fn close_door(&self) {
        self.transport.send(&Command::Close.to_string());
    }

    /// Opaque passthrough for provisioning text (`enroll`, `delete all`, …).
    pub fn send_raw(&self, command: &str) {
        self.transport.send(command);
    }

    /// Register a secondary listener. Listeners run in registration order,
    /// after internal logic and the primary callback.
    pub fn add_listener(&self, listener: impl Fn(&SerialLine) + Send + Sync + 'static) {
        self.shared.listeners.lock().unwrap().push(Arc::new(listener));
    }

    /// Subscribe to door lifecycle events (pause/resume wiring).
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<DoorEvent> {
        self.shared.events.subscribe()
    }

    /// Stop the controller: cancel any pending auto-close, close the
    /// transport, and wait for the dispatch loop to drain.
    pub async fn shutdown(&self) {
        cancel_auto_close(&self.shared);
        self.transport.close();

        let task = self.dispatch.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "dispatch task failed");
                }
            }
        }
        info!("door controller shut down");
    }
}

/// The dispatch task: owns the collaborators, drives all mutation.
struct Dispatcher<S, L, T> {
    shared: Arc<Shared>,
    transport: LineTransport,
    store: S,
    log: L,
    settings: T,
    primary: Option<LineCallback>,
}

impl<S, L, T> Dispatcher<S, L, T>
where
    S: CredentialStore,
    L: AccessLog,
    T: SettingsSource,
{
    async fn run(self, mut lines: mpsc::UnboundedReceiver<SerialLine>) {
        self.bootstrap_settings().await;
        debug!("dispatch loop running");

        while let Some(line) = lines.recv().await {
            trace!(seq = line.seq, text = %line.text, "line received");

            // Stage 1: internal logic. Errors are handled as values inside;
            // this guard only contains panics.
            self.handle_logic(&line).await;

            // Stage 2: primary callback.
            if let Some(primary) = &self.primary {
                supervised("primary callback", || primary(&line));
            }

            // Stage 3: secondary listeners, registration order. The vec is
            // cloned so a listener registering another listener cannot
            // deadlock the dispatch.
            let listeners: Vec<Listener> = self.shared.listeners.lock().unwrap().clone();
            for listener in &listeners {
                supervised("listener", || listener(&line));
            }
        }

        // Line stream ended (transport closed); no timer may outlive it.
        cancel_auto_close(&self.shared);
        debug!("dispatch loop ended");
    }

    /// Best-effort initial hold-time load.
    async fn bootstrap_settings(&self) {
        match self.settings.get().await {
            Ok(settings) => {
                *self.shared.hold_time.lock().unwrap() =
                    Duration::from_secs(settings.hold_time_secs);
                debug!(hold_secs = settings.hold_time_secs, "settings loaded");
            }
            Err(e) => debug!(error = %e, "initial settings unavailable; using defaults"),
        }
    }

    async fn handle_logic(&self, line: &SerialLine) {
        match LineEvent::parse(&line.text) {
            LineEvent::DoorOpening => self.on_door_opening(),
            LineEvent::DoorOpened => self.on_door_opened().await,
            LineEvent::DoorClosing => self.on_door_closing(),
            LineEvent::DoorClosed => self.on_door_closed().await,
            LineEvent::Passcode(code) => self.verify_passcode(&code).await,
            LineEvent::FingerFound { slot } => self.on_fingerprint(slot, true).await,
            LineEvent::FingerNotFound => self.on_fingerprint(None, false).await,
            LineEvent::Unrecognized => {}
        }
    }

    fn on_door_opening(&self) {
        self.set_state(DoorState::Opening);
        self.shared.busy.store(true, Ordering::Relaxed);
        self.emit(DoorEvent::Opening);
    }

    async fn on_door_opened(&self) {
        self.set_state(DoorState::OpenHold);
        arm_auto_close(&self.shared, &self.transport);
        self.emit(DoorEvent::Opened);

        if let Err(e) = self.settings.set_door_state("open").await {
            debug!(error = %e, "door state not persisted");
        }
    }

    fn on_door_closing(&self) {
        self.set_state(DoorState::Closing);
        cancel_auto_close(&self.shared);
        self.emit(DoorEvent::Closing);
    }

    async fn on_door_closed(&self) {
        self.set_state(DoorState::Closed);
        self.shared.busy.store(false, Ordering::Relaxed);
        // Covers a missed "door closing" line.
        cancel_auto_close(&self.shared);
        self.emit(DoorEvent::Closed);

        if let Err(e) = self.settings.set_door_state("close").await {
            debug!(error = %e, "door state not persisted");
        }
    }

    /// Keypad verification pipeline.
    ///
    /// Toggle check, then main credential, then active guests in store
    /// order. Exactly one access attempt is recorded per entered code. A
    /// command is only ever sent on a positive match; store failures fail
    /// closed.
    async fn verify_passcode(&self, code: &str) {
        let code = code.trim();
        if code.is_empty() {
            return;
        }

        let enabled = match self.settings.get().await {
            Ok(settings) => settings.passcode_enabled,
            Err(e) => {
                warn!(error = %e, "settings unavailable; assuming passcode enabled");
                true
            }
        };
        if !enabled {
            info!("keypad entry while passcode disabled");
            self.record(AccessAttempt::new(
                AccessMethod::Passcode,
                AccessOutcome::Blocked,
            ))
            .await;
            return;
        }

        match self.match_code(code).await {
            Ok(CodeMatch::Main) => {
                info!("main passcode matched");
                self.grant_passcode().await;
            }
            Ok(CodeMatch::Guest(guest)) => {
                info!(id = guest.id, one_time = guest.is_one_time, "guest passcode matched");
                if guest.is_one_time {
                    if let Err(e) = self.store.mark_used(guest.id).await {
                        warn!(id = guest.id, error = %e, "failed to mark one-time code used");
                    }
                }
                self.grant_passcode().await;
            }
            Ok(CodeMatch::None) => {
                info!("passcode denied");
                self.record(AccessAttempt::new(
                    AccessMethod::Passcode,
                    AccessOutcome::Denied,
                ))
                .await;
            }
            Err(e) => {
                warn!(error = %e, "credential store unavailable; failing closed");
                self.record(AccessAttempt::new(
                    AccessMethod::Passcode,
                    AccessOutcome::Denied,
                ))
                .await;
            }
        }
    }

    async fn grant_passcode(&self) {
        self.transport.send(&Command::OpenPasscode.to_string());
        self.record(AccessAttempt::new(
            AccessMethod::Passcode,
            AccessOutcome::Granted,
        ))
        .await;
    }

    /// Main first; otherwise the first matching active guest in store order.
    async fn match_code(&self, code: &str) -> latchkey_core::Result<CodeMatch> {
        match self.store.verify_main(code).await {
            Ok(true) => return Ok(CodeMatch::Main),
            Ok(false) => {}
            // A broken main lookup must not lock out valid guest codes.
            Err(e) => warn!(error = %e, "main credential check failed"),
        }

        for guest in self.store.list_active_guests().await? {
            let plain = match self.store.reveal_guest(guest.id).await {
                Ok(plain) => plain,
                Err(e) => {
                    warn!(id = guest.id, error = %e, "guest reveal failed");
                    continue;
                }
            };
            if !plain.is_empty() && constant_time_eq(&plain, code) {
                return Ok(CodeMatch::Guest(guest));
            }
        }

        Ok(CodeMatch::None)
    }

    /// Fingerprint verdicts are informational: the sensor has already
    /// decided, and on a match the device opens the door itself. The host
    /// records the attempt and sends nothing.
    async fn on_fingerprint(&self, slot: Option<u32>, granted: bool) {
        if granted {
            info!(?slot, "fingerprint accepted by sensor");
        } else {
            info!("fingerprint rejected by sensor");
        }
        let outcome = if granted {
            AccessOutcome::Granted
        } else {
            AccessOutcome::Denied
        };
        self.record(AccessAttempt::new(AccessMethod::Fingerprint, outcome))
            .await;
    }

    async fn record(&self, attempt: AccessAttempt) {
        let summary = format!("{} {}", attempt.method, attempt.outcome);
        if let Err(e) = self.log.record(attempt).await {
            warn!(attempt = %summary, error = %e, "access log write failed");
        }
    }

    fn set_state(&self, new: DoorState) {
        let mut state = self.shared.state.lock().unwrap();
        if *state != new && !state.can_transition_to(new) {
            debug!(from = %state, to = %new, "unexpected door state jump");
        }
        *state = new;
    }

    fn emit(&self, event: DoorEvent) {
        // No receivers is fine; events are an optional wiring point.
        let _ = self.shared.events.send(event);
    }
}

enum CodeMatch {
    Main,
    Guest(Credential),
    None,
}

/// Arm the auto-close timer, replacing any outstanding one.
fn arm_auto_close(shared: &Arc<Shared>, transport: &LineTransport) {
    let hold = *shared.hold_time.lock().unwrap();
    if hold.is_zero() {
        debug!("hold time 0; auto-close disabled");
        return;
    }

    let mut auto_close = shared.auto_close.lock().unwrap();
    auto_close.generation = auto_close.generation.wrapping_add(1);
    let generation = auto_close.generation;
    if let Some(previous) = auto_close.task.take() {
        previous.abort();
    }

    let shared_task = Arc::clone(shared);
    let transport = transport.clone();
    auto_close.task = Some(tokio::spawn(async move {
        tokio::time::sleep(hold).await;

        // Fire under the same lock arming and cancelling take: a cancel
        // that completed first has bumped the generation, and a concurrent
        // cancel waits until the send is done.
        let mut auto_close = shared_task.auto_close.lock().unwrap();
        if auto_close.generation != generation {
            return;
        }
        auto_close.task = None;
        debug!(hold_secs = hold.as_secs(), "auto-close firing");
        transport.send(&Command::Close.to_string());
    }));
    debug!(hold_secs = hold.as_secs(), "auto-close armed");
}

/// Cancel any outstanding auto-close. A canceled timer never sends.
fn cancel_auto_close(shared: &Shared) {
    let mut auto_close = shared.auto_close.lock().unwrap();
    auto_close.generation = auto_close.generation.wrapping_add(1);
    if let Some(task) = auto_close.task.take() {
        task.abort();
        debug!("auto-close canceled");
    }
}

/// Per-stage isolation wrapper: a panicking stage is logged and contained,
/// delivery continues.
fn supervised(stage: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(stage, "dispatch stage panicked; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervised_contains_panics() {
        supervised("test", || panic!("boom"));
        // Reaching here is the assertion.
    }

    #[test]
    fn test_auto_close_default() {
        let auto_close = AutoClose::default();
        assert_eq!(auto_close.generation, 0);
        assert!(auto_close.task.is_none());
    }
}
