//! src/eventbus/event_logger.rs
//!
//! Spawns a task that watches the whole directory and writes one trace line per
//! committed change. Drains whatever is still queued on shutdown.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::eventbus::{ChatEvent, EventBus};

pub const EVENT_LOGGER_VIEWER_ID: &str = "__event_logger";

/// Subscribes first, then spawns the loop, so no event committed after this
/// returns is missed.
pub async fn spawn_event_logger_task(event_bus: Arc<EventBus>) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe_directory(EVENT_LOGGER_VIEWER_ID).await;
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("Event logger task started.");
        loop {
            tokio::select! {
                biased;
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => log_event(&event),
                        None => {
                            info!("Event logger channel closed => break from loop.");
                            break;
                        }
                    }
                },
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Event logger shutting down => break from loop.");
                        break;
                    }
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            log_event(&event);
        }
        event_bus.unsubscribe_viewer(EVENT_LOGGER_VIEWER_ID).await;
        info!("Event logger task exited completely.");
    })
}

fn log_event(event: &ChatEvent) {
    let s = event.session();
    match event {
        ChatEvent::MessageAppended { message, .. } => debug!(
            session_id = %s.id,
            seq = message.seq,
            role = %message.sender_role,
            unread_staff = s.unread_for_staff,
            unread_customer = s.unread_for_customer,
            "{}", event.event_type()
        ),
        ChatEvent::SessionCreated { .. }
        | ChatEvent::SessionUpdated { .. }
        | ChatEvent::ReadAcknowledged { .. } => debug!(
            session_id = %s.id,
            state = %s.state(),
            assigned = ?s.assigned_staff_id,
            "{}", event.event_type()
        ),
    }
}
