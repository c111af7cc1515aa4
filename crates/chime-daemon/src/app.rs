use std::path::Path;
use std::sync::Arc;

use chime_core::ChimeConfig;
use chime_scheduler::{
    AlarmDispatcher, ChannelDispatcher, EngineOptions, FireEvent, ReminderEngine, StatusEvent,
    SystemClock, TokioWakeFacility, TracingDispatcher, WakeFacility,
};
use chime_store::{import_legacy_json, SqliteReminderStore};
use chrono::Local;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, warn};

/// Capacity of the fired-event channel between the engine and the alarm task.
const FIRED_CHANNEL_CAPACITY: usize = 256;

/// Open the reminder database (WAL mode), creating its directory if needed.
pub fn open_store(db_path: &str) -> anyhow::Result<Arc<SqliteReminderStore>> {
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(Arc::new(SqliteReminderStore::new(db)?))
}

/// Long-running mode: engine loop, alarm delivery and status reporting until Ctrl-C.
pub async fn run(config: ChimeConfig, store: Arc<SqliteReminderStore>) -> anyhow::Result<()> {
    import_on_first_start(&config, &store)?;

    // Fired-event channel: engine → alarm task
    let (dispatcher, fired_rx) = ChannelDispatcher::channel(FIRED_CHANNEL_CAPACITY);
    tokio::spawn(present_alarms(fired_rx, Arc::new(TracingDispatcher::new())));

    let (facility, wake_rx) = TokioWakeFacility::new(config.scheduler.max_armed_wakes);
    let (wake, wake_rx) = if config.scheduler.wake_enabled {
        let facility: Arc<dyn WakeFacility> = Arc::new(facility);
        (Some(facility), Some(wake_rx))
    } else {
        (None, None)
    };

    let engine = Arc::new(ReminderEngine::<Local>::new(
        store,
        Arc::new(dispatcher),
        Arc::new(SystemClock),
        wake,
        EngineOptions::from(&config.scheduler),
    ));
    engine.attach();
    tokio::spawn(report_status(engine.subscribe_status()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = tokio::spawn(Arc::clone(&engine).run(wake_rx, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    engine_task.await?;

    let degraded = engine.degraded();
    if !degraded.is_empty() {
        warn!(count = degraded.len(), "exiting with degraded reminders");
    }
    Ok(())
}

/// Import `[import].reminders_json` once, while the database is still empty.
fn import_on_first_start(config: &ChimeConfig, store: &SqliteReminderStore) -> anyhow::Result<()> {
    let Some(path) = config.import.reminders_json.as_deref() else {
        return Ok(());
    };
    if store.count()? > 0 {
        return Ok(());
    }
    let path = Path::new(path);
    if !path.exists() {
        warn!(path = %path.display(), "legacy reminders file not found, skipping import");
        return Ok(());
    }
    import_legacy_json(path, store)?;
    Ok(())
}

/// Presents fired alarms off the engine's path.
async fn present_alarms(mut fired_rx: mpsc::Receiver<FireEvent>, alarms: Arc<TracingDispatcher>) {
    while let Some(event) = fired_rx.recv().await {
        if let Err(e) = alarms.dispatch(&event).await {
            warn!(reminder_id = %event.id(), "alarm presentation failed: {e}");
        }
    }
}

async fn report_status(mut status_rx: broadcast::Receiver<StatusEvent>) {
    loop {
        match status_rx.recv().await {
            Ok(StatusEvent::Degraded { id, reason }) => {
                warn!(reminder_id = %id, %reason, "reminder may not fire reliably while suspended");
            }
            Ok(StatusEvent::Recovered { id }) => {
                info!(reminder_id = %id, "reminder wake re-armed");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "status reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
