//! Wiring harness: transport + storage + controller + provisioning +
//! recognition scheduling, configured from the environment.
//!
//! Environment:
//! - `SERIAL_PORT` — device path, empty or `AUTO` for auto-detection;
//!   inline `;`/`#` comments are stripped
//! - `SERIAL_BAUD` — line speed, default 57600
//! - `LATCHKEY_DB` — SQLite path, default `latchkey.db`
//! - `RUST_LOG` — tracing filter, default `info`
//!
//! Runs headless: inbound lines echo to stdout, Ctrl-C shuts down.

use anyhow::Result;
use latchkey_core::constants::{DEFAULT_BAUD, PORT_AUTO};
use latchkey_door::{DoorController, DoorEvent};
use latchkey_fingerprint::{CommandChannel, FingerprintProvisioner};
use latchkey_recognition::{
    FaceMatcher, FrameSource, MatchOutcome, RecognitionCallbacks, RecognitionError,
    RecognitionScheduler, SchedulerConfig,
};
use latchkey_storage::{
    Database, DatabaseConfig, SqliteAccessLogRepository, SqlitePasscodeRepository,
    SqliteSettingsRepository,
};
use latchkey_transport::{LineTransport, TransportConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct AppConfig {
    port: String,
    baud: u32,
    database_path: String,
}

impl AppConfig {
    fn from_env() -> Self {
        let port = std::env::var("SERIAL_PORT").unwrap_or_else(|_| PORT_AUTO.to_string());
        let baud = std::env::var("SERIAL_BAUD")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_BAUD);
        let database_path =
            std::env::var("LATCHKEY_DB").unwrap_or_else(|_| "latchkey.db".to_string());
        Self {
            port,
            baud,
            database_path,
        }
    }
}

/// Camera integration is provided by the embedding application; headless
/// runs use a source that never yields a frame.
struct NoCamera;

impl FrameSource for NoCamera {
    type Frame = ();

    fn latest(&mut self) -> Option<()> {
        None
    }
}

struct NoMatcher;

impl FaceMatcher<()> for NoMatcher {
    fn match_with_box(&mut self, _frame: &(), _threshold: f32) -> Result<MatchOutcome, RecognitionError> {
        Ok(MatchOutcome::none())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();

    let db = Database::new(DatabaseConfig::new(&config.database_path)).await?;
    let credentials = SqlitePasscodeRepository::new(db.pool().clone());
    let access_log = SqliteAccessLogRepository::new(db.pool().clone());
    let settings = SqliteSettingsRepository::new(db.pool().clone());

    let (transport, lines) =
        LineTransport::open(TransportConfig::new(config.port.clone(), config.baud));
    if !transport.is_connected() {
        warn!("no serial device; running disconnected (sends are no-ops)");
    }

    let controller = Arc::new(DoorController::spawn(
        transport.clone(),
        lines,
        credentials,
        access_log,
        settings.clone(),
        Some(Box::new(|line| println!("<< {}", line.text))),
    ));

    // Provisioning shares the transport through the controller's fan-out.
    let channel = CommandChannel::new(transport.clone());
    controller.add_listener(channel.listener());
    let provisioner = FingerprintProvisioner::new(channel);
    info!(connected = provisioner.is_connected(), "provisioning ready");

    // Recognition: confirmed hits open the door on the face channel.
    let hit_controller = Arc::clone(&controller);
    let callbacks = RecognitionCallbacks::new()
        .on_status(|status| info!(target: "latchkey::face", "{status}"))
        .on_hit(move |name, distance| {
            info!(name, distance, "face hit confirmed; opening");
            hit_controller.open_face();
        });
    let scheduler = Arc::new(RecognitionScheduler::spawn(
        NoCamera,
        NoMatcher,
        settings,
        callbacks,
        SchedulerConfig::default(),
    ));

    // Door events drive pause/resume so an open door suspends matching.
    let mut events = controller.subscribe_events();
    let event_scheduler = Arc::clone(&scheduler);
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DoorEvent::Opening => event_scheduler.pause(),
                DoorEvent::Closed => event_scheduler.resume(),
                _ => {}
            }
        }
    });

    info!(
        port = %config.port,
        baud = config.baud,
        db = %config.database_path,
        "latchkey running; Ctrl-C to exit"
    );
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    scheduler.shutdown().await;
    controller.shutdown().await;
    db.close().await;
    Ok(())
}
