//! End-to-end controller tests over an in-memory link and in-memory
//! collaborators. Time-sensitive cases run on tokio's paused clock.

use latchkey_core::{
    AccessAttempt, AccessLog, AccessMethod, AccessOutcome, Credential, CredentialStore, Error,
    Result, Settings, SettingsSource,
};
use latchkey_door::{DoorController, DoorEvent, DoorState};
use latchkey_transport::{LineTransport, MockLink, MockLinkHandle, SerialLine, TransportConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
struct GuestCode {
    id: i64,
    code: String,
    one_time: bool,
    used: bool,
}

/// In-memory credential store.
#[derive(Clone, Default)]
struct MemStore {
    main: Option<String>,
    guests: Arc<Mutex<Vec<GuestCode>>>,
    fail: bool,
}

impl MemStore {
    fn with_main(code: &str) -> Self {
        Self {
            main: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn add_guest(&self, id: i64, code: &str, one_time: bool) {
        self.guests.lock().unwrap().push(GuestCode {
            id,
            code: code.to_string(),
            one_time,
            used: false,
        });
    }

    fn guest_used(&self, id: i64) -> bool {
        self.guests
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.used)
            .unwrap_or(false)
    }
}

impl CredentialStore for MemStore {
    async fn verify_main(&self, code: &str) -> Result<bool> {
        if self.fail {
            return Err(Error::Store("store down".into()));
        }
        Ok(self.main.as_deref() == Some(code))
    }

    async fn list_active_guests(&self) -> Result<Vec<Credential>> {
        if self.fail {
            return Err(Error::Store("store down".into()));
        }
        Ok(self
            .guests
            .lock()
            .unwrap()
            .iter()
            .filter(|g| !g.used)
            .map(|g| Credential {
                id: g.id,
                masked: g.code.clone(),
                is_main: false,
                is_one_time: g.one_time,
                used: g.used,
                valid_until: None,
            })
            .collect())
    }

    async fn reveal_main(&self) -> Result<String> {
        Ok(self.main.clone().unwrap_or_default())
    }

    async fn reveal_guest(&self, id: i64) -> Result<String> {
        Ok(self
            .guests
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.code.clone())
            .unwrap_or_default())
    }

    async fn mark_used(&self, id: i64) -> Result<()> {
        for guest in self.guests.lock().unwrap().iter_mut() {
            if guest.id == id {
                guest.used = true;
            }
        }
        Ok(())
    }
}

/// In-memory access log.
#[derive(Clone, Default)]
struct MemLog {
    attempts: Arc<Mutex<Vec<AccessAttempt>>>,
}

impl MemLog {
    fn attempts(&self) -> Vec<AccessAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    fn count(&self, method: AccessMethod, outcome: AccessOutcome) -> usize {
        self.attempts()
            .iter()
            .filter(|a| a.method == method && a.outcome == outcome)
            .count()
    }
}

impl AccessLog for MemLog {
    async fn record(&self, attempt: AccessAttempt) -> Result<()> {
        self.attempts.lock().unwrap().push(attempt);
        Ok(())
    }
}

/// In-memory settings source.
#[derive(Clone)]
struct MemSettings {
    settings: Arc<Mutex<Settings>>,
    door_states: Arc<Mutex<Vec<String>>>,
}

impl Default for MemSettings {
    fn default() -> Self {
        Self {
            settings: Arc::new(Mutex::new(Settings::default())),
            door_states: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MemSettings {
    fn set(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.settings.lock().unwrap());
    }
}

impl SettingsSource for MemSettings {
    async fn get(&self) -> Result<Settings> {
        Ok(*self.settings.lock().unwrap())
    }

    async fn set_door_state(&self, state: &str) -> Result<()> {
        self.door_states.lock().unwrap().push(state.to_string());
        Ok(())
    }
}

struct Harness {
    controller: DoorController,
    lines: mpsc::UnboundedSender<SerialLine>,
    link: MockLinkHandle,
    log: MemLog,
    settings: MemSettings,
    seq: AtomicU64,
}

impl Harness {
    fn new(store: MemStore) -> Self {
        Self::with_settings(store, MemSettings::default())
    }

    fn with_settings(store: MemStore, settings: MemSettings) -> Self {
        Self::build(store, settings, None)
    }

    fn build(
        store: MemStore,
        settings: MemSettings,
        primary: Option<latchkey_door::LineCallback>,
    ) -> Self {
        let (reader, writer, link) = MockLink::new();
        let (transport, _device_rx) =
            LineTransport::open_with_link(reader, writer, TransportConfig::default());
        // Lines are injected directly so tests control arrival exactly.
        let (lines, lines_rx) = mpsc::unbounded_channel();
        let log = MemLog::default();
        let controller = DoorController::spawn(
            transport,
            lines_rx,
            store,
            log.clone(),
            settings.clone(),
            primary,
        );
        Self {
            controller,
            lines,
            link,
            log,
            settings,
            seq: AtomicU64::new(0),
        }
    }

    fn feed(&self, text: &str) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.lines
            .send(SerialLine {
                seq,
                text: text.to_string(),
            })
            .unwrap();
    }

    fn closes_sent(&self) -> usize {
        self.link
            .sent_lines()
            .iter()
            .filter(|l| l.as_str() == "close")
            .count()
    }

    fn opens_sent(&self) -> usize {
        self.link
            .sent_lines()
            .iter()
            .filter(|l| l.as_str() == "open passcode")
            .count()
    }

    /// Close the injected line stream, then drain the controller.
    async fn shutdown(self) {
        let Harness {
            controller, lines, ..
        } = self;
        drop(lines);
        controller.shutdown().await;
    }
}

/// Let the dispatch task and any ready timers run.
async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn door_state_follows_the_line_table() {
    let h = Harness::new(MemStore::default());
    assert_eq!(h.controller.state(), DoorState::Closed);
    assert!(!h.controller.is_busy());

    h.feed("Inform door opening manual");
    settle().await;
    assert_eq!(h.controller.state(), DoorState::Opening);
    assert!(h.controller.is_busy());

    h.feed("some unrelated chatter");
    settle().await;
    assert_eq!(h.controller.state(), DoorState::Opening);

    h.feed("Inform door opened");
    settle().await;
    assert_eq!(h.controller.state(), DoorState::OpenHold);

    h.feed("Inform door closing");
    settle().await;
    assert_eq!(h.controller.state(), DoorState::Closing);

    h.feed("Inform door closed");
    settle().await;
    assert_eq!(h.controller.state(), DoorState::Closed);
    assert!(!h.controller.is_busy());

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn autoclose_fires_exactly_once_after_hold() {
    let h = Harness::new(MemStore::default());

    h.feed("Inform door opened");
    settle().await;
    assert_eq!(h.closes_sent(), 0);

    tokio::time::advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 1);

    // No further sends later.
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rearming_replaces_the_previous_timer() {
    let h = Harness::new(MemStore::default());

    h.feed("Inform door opened");
    settle().await;
    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;

    // Re-arm: the later arm wins, the earlier timer must never fire.
    h.feed("Inform door opened");
    settle().await;

    // 3s later the first timer would have fired.
    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 0);

    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn canceled_timer_never_sends_close() {
    let h = Harness::new(MemStore::default());

    h.feed("Inform door opened");
    settle().await;
    h.feed("Inform door closing");
    settle().await;

    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 0);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_just_before_deadline_wins() {
    let h = Harness::new(MemStore::default());

    h.feed("Inform door opened");
    settle().await;
    tokio::time::advance(Duration::from_millis(4_990)).await;
    settle().await;

    h.feed("Inform door closing");
    settle().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 0);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hold_time_zero_disables_autoclose() {
    let h = Harness::new(MemStore::default());
    h.controller.set_hold_time(0);

    h.feed("Inform door opened");
    settle().await;
    tokio::time::advance(Duration::from_secs(120)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 0);

    // Negative values clamp to zero.
    h.controller.set_hold_time(-7);
    assert_eq!(h.controller.hold_time(), Duration::ZERO);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hold_time_bootstraps_from_settings() {
    let settings = MemSettings::default();
    settings.set(|s| s.hold_time_secs = 2);
    let h = Harness::with_settings(MemStore::default(), settings);
    settle().await;

    assert_eq!(h.controller.hold_time(), Duration::from_secs(2));

    h.feed("Inform door opened");
    settle().await;
    tokio::time::advance(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(h.closes_sent(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn passcode_grant_end_to_end() {
    let h = Harness::new(MemStore::with_main("1234"));

    h.feed("Inform passcode 1234");
    settle().await;

    assert_eq!(h.opens_sent(), 1);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Granted), 1);
    assert_eq!(h.log.attempts().len(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn wrong_passcode_denied_without_send() {
    let h = Harness::new(MemStore::with_main("1234"));

    h.feed("Inform passcode 9999");
    settle().await;

    assert_eq!(h.opens_sent(), 0);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Denied), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn passcode_disabled_records_blocked() {
    let settings = MemSettings::default();
    settings.set(|s| s.passcode_enabled = false);
    let h = Harness::with_settings(MemStore::with_main("1234"), settings);

    h.feed("Inform passcode 1234");
    settle().await;

    assert_eq!(h.opens_sent(), 0);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Blocked), 1);
    assert_eq!(h.log.attempts().len(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn one_time_guest_matches_at_most_once() {
    let store = MemStore::with_main("0000");
    store.add_guest(7, "4321", true);
    let h = Harness::new(store.clone());

    h.feed("Inform passcode 4321");
    settle().await;
    assert_eq!(h.opens_sent(), 1);
    assert!(store.guest_used(7));

    h.feed("Inform passcode 4321");
    settle().await;
    assert_eq!(h.opens_sent(), 1);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Granted), 1);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Denied), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn main_credential_wins_over_identical_guest() {
    let store = MemStore::with_main("1234");
    store.add_guest(3, "1234", true);
    let h = Harness::new(store.clone());

    h.feed("Inform passcode 1234");
    settle().await;

    assert_eq!(h.opens_sent(), 1);
    // The guest was never consumed: main matched first.
    assert!(!store.guest_used(3));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn store_failure_fails_closed() {
    let store = MemStore {
        fail: true,
        ..MemStore::with_main("1234")
    };
    let h = Harness::new(store);

    h.feed("Inform passcode 1234");
    settle().await;

    assert_eq!(h.opens_sent(), 0);
    assert_eq!(h.log.count(AccessMethod::Passcode, AccessOutcome::Denied), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fingerprint_lines_are_log_only() {
    let h = Harness::new(MemStore::default());

    h.feed("Inform finger found, ID:7");
    settle().await;
    assert_eq!(
        h.log.count(AccessMethod::Fingerprint, AccessOutcome::Granted),
        1
    );
    assert!(h.link.sent_lines().is_empty());

    h.feed("Inform finger not found");
    settle().await;
    assert_eq!(
        h.log.count(AccessMethod::Fingerprint, AccessOutcome::Denied),
        1
    );
    assert!(h.link.sent_lines().is_empty());

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dispatch_order_is_logic_primary_listeners() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let primary_order = Arc::clone(&order);
    let h = Harness::build(
        MemStore::default(),
        MemSettings::default(),
        Some(Box::new(move |_line| {
            primary_order.lock().unwrap().push("primary");
        })),
    );

    let first = Arc::clone(&order);
    h.controller.add_listener(move |_line| {
        first.lock().unwrap().push("listener-1");
    });
    let second = Arc::clone(&order);
    h.controller.add_listener(move |_line| {
        second.lock().unwrap().push("listener-2");
    });

    h.feed("anything at all");
    settle().await;

    assert_eq!(
        order.lock().unwrap().as_slice(),
        &["primary", "listener-1", "listener-2"]
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn faulting_listener_is_isolated() {
    let h = Harness::new(MemStore::with_main("1234"));

    h.controller.add_listener(|_line| panic!("listener bug"));
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_listener = Arc::clone(&seen);
    h.controller.add_listener(move |line| {
        seen_in_listener.lock().unwrap().push(line.text.clone());
    });

    h.feed("line one");
    h.feed("line two");
    settle().await;

    // Delivery continued past the faulting listener, on both lines.
    assert_eq!(seen.lock().unwrap().len(), 2);

    // And the dispatch loop survived to process real traffic.
    h.feed("Inform passcode 1234");
    settle().await;
    assert_eq!(h.opens_sent(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn door_events_are_republished() {
    let h = Harness::new(MemStore::default());
    let mut events = h.controller.subscribe_events();

    h.feed("Inform door opening face");
    h.feed("Inform door opened");
    h.feed("Inform door closing");
    h.feed("Inform door closed");
    settle().await;

    assert_eq!(events.try_recv().unwrap(), DoorEvent::Opening);
    assert_eq!(events.try_recv().unwrap(), DoorEvent::Opened);
    assert_eq!(events.try_recv().unwrap(), DoorEvent::Closing);
    assert_eq!(events.try_recv().unwrap(), DoorEvent::Closed);

    // Door state was persisted for the UI on open and close.
    assert_eq!(
        h.settings.door_states.lock().unwrap().as_slice(),
        &["open", "close"]
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_commands_reach_the_wire() {
    let h = Harness::new(MemStore::default());

    h.controller.open_door();
    h.controller.close_door();
    h.controller.open_face();
    h.controller.send_raw("delete all");

    assert_eq!(
        h.link.sent_lines(),
        vec!["open manual", "close", "open face", "delete all"]
    );

    h.shutdown().await;
}
