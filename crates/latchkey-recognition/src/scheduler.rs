//! The confirm-then-commit polling loop.

use crate::error::RecognitionError;
use crate::overlay::Overlay;
use crate::traits::{FaceMatcher, FrameSource};
use latchkey_core::SettingsSource;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Scheduler tuning.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Tick period. Floored at 300 ms — matching below that starves the CPU.
    pub period: Duration,

    /// Embedding distance threshold handed to the matcher.
    pub threshold: f32,

    /// Minimum gap between "no match" status emissions.
    pub deny_cooldown: Duration,

    /// Minimum gap between arming two matches.
    pub match_cooldown: Duration,

    /// How long a first match is held before the hit commits.
    pub match_hold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(800),
            threshold: 0.30,
            deny_cooldown: Duration::from_secs(5),
            match_cooldown: Duration::from_secs(2),
            match_hold: Duration::from_secs(2),
        }
    }
}

/// A first qualifying match being held for confirmation.
///
/// At most one exists at a time; it lives from arming until either the hold
/// window elapses (hit fires) or a pause/resume invalidates it.
#[derive(Debug, Clone)]
pub struct PendingMatch {
    pub name: String,
    pub distance: f32,
    pub armed_at: Instant,
}

/// Event sinks for the scheduler. All default to no-ops.
pub struct RecognitionCallbacks {
    on_status: Box<dyn Fn(&str) + Send + Sync>,
    on_hit: Box<dyn Fn(&str, f32) + Send + Sync>,
    on_overlay: Box<dyn Fn(Option<Overlay>) + Send + Sync>,
}

impl Default for RecognitionCallbacks {
    fn default() -> Self {
        Self {
            on_status: Box::new(|_| {}),
            on_hit: Box::new(|_, _| {}),
            on_overlay: Box::new(|_| {}),
        }
    }
}

impl RecognitionCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status line sink ("Face: ready", "Face: no match", …).
    #[must_use]
    pub fn on_status(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_status = Box::new(f);
        self
    }

    /// Confirmed-match sink: `(name, distance)`. Fired exactly once per
    /// armed match; the scheduler pauses itself right after.
    #[must_use]
    pub fn on_hit(mut self, f: impl Fn(&str, f32) + Send + Sync + 'static) -> Self {
        self.on_hit = Box::new(f);
        self
    }

    /// Overlay sink; `None` means "no annotation".
    #[must_use]
    pub fn on_overlay(mut self, f: impl Fn(Option<Overlay>) + Send + Sync + 'static) -> Self {
        self.on_overlay = Box::new(f);
        self
    }
}

#[derive(Default)]
struct RecogState {
    pending: Option<PendingMatch>,
    last_match_at: Option<Instant>,
    last_deny_at: Option<Instant>,
}

struct Shared {
    paused: AtomicBool,
    stopped: AtomicBool,
    state: Mutex<RecogState>,
    callbacks: RecognitionCallbacks,
}

impl Shared {
    /// Pause: idempotent, safe in any state. Clears the pending match and
    /// the visual annotation immediately.
    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.state.lock().unwrap().pending = None;
        (self.callbacks.on_overlay)(None);
    }
}

/// Handle to a running recognition loop.
pub struct RecognitionScheduler {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RecognitionScheduler {
    /// Spawn the loop. Must be called inside a tokio runtime.
    pub fn spawn<S, M, T>(
        source: S,
        matcher: M,
        settings: T,
        callbacks: RecognitionCallbacks,
        config: SchedulerConfig,
    ) -> Self
    where
        S: FrameSource,
        M: FaceMatcher<S::Frame>,
        T: SettingsSource + 'static,
    {
        let shared = Arc::new(Shared {
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            state: Mutex::new(RecogState::default()),
            callbacks,
        });

        let config = SchedulerConfig {
            period: config.period.max(Duration::from_millis(300)),
            ..config
        };

        let loop_ = RecognitionLoop {
            shared: Arc::clone(&shared),
            source,
            matcher,
            settings,
            config,
        };
        let task = tokio::spawn(loop_.run());

        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Suspend recognition and drop any pending match and annotation.
    /// Idempotent; always safe to call.
    pub fn pause(&self) {
        debug!("recognition paused");
        self.shared.pause();
    }

    /// Resume recognition with fully reset memory: pending match and both
    /// cooldowns are cleared, so a reopened door cannot inherit a stale
    /// detection.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
        {
            let mut state = self.shared.state.lock().unwrap();
            state.pending = None;
            state.last_match_at = None;
            state.last_deny_at = None;
        }
        (self.shared.callbacks.on_status)("Face: resumed");
        debug!("recognition resumed");
    }

    /// Whether the loop is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    /// Request the loop to stop; observed within one tick period.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!(error = %e, "recognition loop failed");
                }
            }
        }
        info!("recognition scheduler shut down");
    }
}

struct RecognitionLoop<S, M, T> {
    shared: Arc<Shared>,
    source: S,
    matcher: M,
    settings: T,
    config: SchedulerConfig,
}

impl<S, M, T> RecognitionLoop<S, M, T>
where
    S: FrameSource,
    M: FaceMatcher<S::Frame>,
    T: SettingsSource,
{
    async fn run(mut self) {
        (self.shared.callbacks.on_status)("Face: ready");

        // A stable period with drift correction: the interval fires on the
        // schedule regardless of how long each tick's work took.
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.shared.stopped.load(Ordering::Relaxed) {
                break;
            }
            if self.shared.paused.load(Ordering::Relaxed) {
                continue;
            }

            if let Err(e) = self.tick().await {
                warn!(error = %e, "recognition tick failed");
                (self.shared.callbacks.on_status)("Face: error");
            }
        }

        (self.shared.callbacks.on_overlay)(None);
        (self.shared.callbacks.on_status)("Face: stopped");
    }

    async fn tick(&mut self) -> Result<(), RecognitionError> {
        // Feature toggle: behaves like Paused but resumes by itself when
        // the setting flips back, with no explicit resume().
        let enabled = match self.settings.get().await {
            Ok(settings) => settings.face_enabled,
            // A dead settings source must not kill the feature.
            Err(_) => true,
        };
        if !enabled {
            {
                let mut state = self.shared.state.lock().unwrap();
                state.pending = None;
                state.last_match_at = None;
                state.last_deny_at = None;
            }
            (self.shared.callbacks.on_overlay)(None);
            (self.shared.callbacks.on_status)("Face: disabled");
            return Ok(());
        }

        let Some(frame) = self.source.latest() else {
            (self.shared.callbacks.on_status)("Face: no frame");
            (self.shared.callbacks.on_overlay)(None);
            return Ok(());
        };

        let now = Instant::now();
        let pending = self.shared.state.lock().unwrap().pending.clone();

        if let Some(pending) = pending {
            return self.armed_tick(&frame, &pending, now);
        }
        self.idle_tick(&frame, now)
    }

    /// Armed: recompute the overlay for live feedback but do not re-decide;
    /// commit the hit once the hold window has elapsed.
    fn armed_tick(
        &mut self,
        frame: &S::Frame,
        pending: &PendingMatch,
        now: Instant,
    ) -> Result<(), RecognitionError> {
        let held = now.saturating_duration_since(pending.armed_at);
        if held >= self.config.match_hold {
            self.shared.state.lock().unwrap().pending = None;
            info!(name = %pending.name, distance = pending.distance, "face match confirmed");
            (self.shared.callbacks.on_hit)(&pending.name, pending.distance);
            // The caller acts on the hit and eventually resumes us.
            self.shared.pause();
            return Ok(());
        }

        let remaining = (self.config.match_hold - held).as_secs_f32();
        (self.shared.callbacks.on_status)(&format!(
            "Face: {} — opening in {remaining:.1}s",
            pending.name
        ));

        let outcome = self.matcher.match_with_box(frame, self.config.threshold)?;
        let overlay = outcome
            .region
            .map(|region| Overlay::matched(region, pending.name.clone()));
        (self.shared.callbacks.on_overlay)(overlay);
        Ok(())
    }

    /// Idle: run one match and maybe arm.
    fn idle_tick(&mut self, frame: &S::Frame, now: Instant) -> Result<(), RecognitionError> {
        let outcome = self.matcher.match_with_box(frame, self.config.threshold)?;

        let overlay = outcome.region.map(|region| match &outcome.name {
            Some(name) if outcome.matched => Overlay::matched(region, name.clone()),
            _ => Overlay::unknown(region),
        });
        (self.shared.callbacks.on_overlay)(overlay);

        if outcome.matched {
            if let Some(name) = outcome.name {
                let armed = {
                    let mut state = self.shared.state.lock().unwrap();
                    if cooldown_elapsed(state.last_match_at, self.config.match_cooldown, now) {
                        state.last_match_at = Some(now);
                        state.pending = Some(PendingMatch {
                            name: name.clone(),
                            distance: outcome.distance,
                            armed_at: now,
                        });
                        true
                    } else {
                        false
                    }
                };
                if armed {
                    debug!(name = %name, distance = outcome.distance, "match armed");
                    (self.shared.callbacks.on_status)(&format!(
                        "Face: {name} — opening in {:.1}s",
                        self.config.match_hold.as_secs_f32()
                    ));
                }
            }
            return Ok(());
        }

        // Rate-limited "no match" so the status stream is not spammed
        // every tick.
        let deny = {
            let mut state = self.shared.state.lock().unwrap();
            if cooldown_elapsed(state.last_deny_at, self.config.deny_cooldown, now) {
                state.last_deny_at = Some(now);
                true
            } else {
                false
            }
        };
        if deny {
            (self.shared.callbacks.on_status)("Face: no match");
        }
        Ok(())
    }
}

fn cooldown_elapsed(since: Option<Instant>, cooldown: Duration, now: Instant) -> bool {
    since.is_none_or(|at| now.saturating_duration_since(at) >= cooldown)
}
