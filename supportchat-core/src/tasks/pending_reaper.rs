// src/tasks/pending_reaper.rs

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::ChatEngine;
use crate::Error;

/// Spawns a background task that periodically closes sessions left waiting in
/// the staff queue for longer than `pending_timeout`. Returns `None` when the
/// policy is disabled.
pub fn spawn_pending_reaper_task(engine: ChatEngine) -> Option<JoinHandle<()>> {
    let idle_for = engine.config().pending_timeout()?;
    let every = engine.config().reaper_interval();
    let mut shutdown_rx = engine.event_bus().shutdown_rx.clone();

    info!("Pending reaper started: idle_for={:?}, interval={:?}", idle_for, every);
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = run_pending_reaper(&engine, idle_for).await {
                        error!("Pending reaper sweep failed: {:?}", e);
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Pending reaper shutting down.");
                        break;
                    }
                }
            }
        }
    }))
}

/// One sweep. Returns how many sessions were closed.
pub async fn run_pending_reaper(engine: &ChatEngine, idle_for: std::time::Duration) -> Result<usize, Error> {
    let idle_for = chrono::Duration::from_std(idle_for)
        .map_err(|e| Error::Config(format!("pending timeout out of range: {}", e)))?;
    let closed = engine.close_idle_pending(idle_for).await?;
    if !closed.is_empty() {
        info!("Pending reaper closed {} abandoned session(s).", closed.len());
    }
    Ok(closed.len())
}
