//! src/eventbus/mod.rs
//!
//! In-process change-notification bus. Every committed change to a session is
//! published here and fanned out, without loss, to the viewers
//! observing that session and to every directory watcher.

pub mod event_logger;

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::trace;
use uuid::Uuid;

use supportchat_common::models::{Audience, ChatMessage, ChatSession, Viewer};

/// What happened to the session in a `SessionUpdated` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    EscalationRequested,
    Claimed,
    Closed,
}

/// A committed change. Each variant carries the session exactly as committed,
/// so observers can re-render without a round trip.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    SessionCreated {
        session: ChatSession,
    },
    MessageAppended {
        session: ChatSession,
        message: ChatMessage,
    },
    SessionUpdated {
        session: ChatSession,
        change: SessionChange,
    },
    ReadAcknowledged {
        session: ChatSession,
        audience: Audience,
    },
}

impl ChatEvent {
    pub fn session(&self) -> &ChatSession {
        match self {
            ChatEvent::SessionCreated { session }
            | ChatEvent::MessageAppended { session, .. }
            | ChatEvent::SessionUpdated { session, .. }
            | ChatEvent::ReadAcknowledged { session, .. } => session,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session().id
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::SessionCreated { .. } => "session.created",
            ChatEvent::MessageAppended { .. } => "message.appended",
            ChatEvent::SessionUpdated { change: SessionChange::EscalationRequested, .. } => "session.escalated",
            ChatEvent::SessionUpdated { change: SessionChange::Claimed, .. } => "session.claimed",
            ChatEvent::SessionUpdated { change: SessionChange::Closed, .. } => "session.closed",
            ChatEvent::ReadAcknowledged { .. } => "session.read",
        }
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    /// Only events of one session (an open conversation view).
    Session(Uuid),
    /// Events of every session (the staff console list).
    Directory,
}

impl SubscriptionScope {
    fn wants(&self, event: &ChatEvent) -> bool {
        match self {
            SubscriptionScope::Session(id) => *id == event.session_id(),
            SubscriptionScope::Directory => true,
        }
    }
}

struct Subscriber {
    viewer_id: String,
    audience: Option<Audience>,
    scope: SubscriptionScope,
    /// Unbounded inbox drained by this subscriber's forwarding task.
    queue: mpsc::UnboundedSender<ChatEvent>,
    /// The bounded channel the viewer reads from; only used to detect a dropped receiver.
    outbox: mpsc::Sender<ChatEvent>,
}

impl Subscriber {
    fn is_gone(&self) -> bool {
        self.queue.is_closed() || self.outbox.is_closed()
    }
}

/// Each subscriber gets its own queue and a forwarding task that moves events
/// into the bounded `mpsc::Receiver<ChatEvent>` handed to the viewer.
///
/// - `publish` never waits on a subscriber. A viewer that stops reading only
///   grows its own queue; commits on other sessions are unaffected.
/// - If a subscriber dropped its `Receiver`, it is pruned on the next publish.
///
/// Per-session ordering comes from the caller: the engine publishes while it
/// still holds the session's write lock, and each queue is FIFO, so events of
/// one session reach every subscriber in commit order.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    buffer_size: usize,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            buffer_size: buffer_size.max(1),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Subscribes a viewer to one session's events.
    pub async fn subscribe_session(&self, viewer: &Viewer, session_id: Uuid) -> mpsc::Receiver<ChatEvent> {
        self.subscribe(&viewer.viewer_id, Some(viewer.audience), SubscriptionScope::Session(session_id))
            .await
    }

    /// Subscribes to every session's events.
    pub async fn subscribe_directory(&self, viewer_id: &str) -> mpsc::Receiver<ChatEvent> {
        self.subscribe(viewer_id, None, SubscriptionScope::Directory).await
    }

    async fn subscribe(
        &self,
        viewer_id: &str,
        audience: Option<Audience>,
        scope: SubscriptionScope,
    ) -> mpsc::Receiver<ChatEvent> {
        let (queue, inbox) = mpsc::unbounded_channel();
        let (outbox, rx) = mpsc::channel(self.buffer_size);
        tokio::spawn(forward_events(inbox, outbox.clone(), viewer_id.to_string()));

        let mut subs = self.subscribers.lock().await;
        subs.push(Subscriber {
            viewer_id: viewer_id.to_string(),
            audience,
            scope,
            queue,
            outbox,
        });
        rx
    }

    /// Drops every subscription held by `viewer_id`. Returns how many were removed.
    ///
    /// Events already queued for the viewer are still delivered; nothing new is.
    pub async fn unsubscribe_viewer(&self, viewer_id: &str) -> usize {
        let mut subs = self.subscribers.lock().await;
        let before = subs.len();
        subs.retain(|s| s.viewer_id != viewer_id);
        before - subs.len()
    }

    /// Viewers with a live subscription to `session_id`.
    pub async fn viewers_of(&self, session_id: Uuid) -> Vec<Viewer> {
        let subs = self.subscribers.lock().await;
        let mut out: Vec<Viewer> = Vec::new();
        for s in subs.iter() {
            if s.scope != SubscriptionScope::Session(session_id) || s.is_gone() {
                continue;
            }
            if let Some(audience) = s.audience {
                let v = Viewer { viewer_id: s.viewer_id.clone(), audience };
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Publish an event to every subscriber whose scope wants it.
    pub async fn publish(&self, event: ChatEvent) {
        let mut subs = self.subscribers.lock().await;
        let mut saw_closed = false;
        for s in subs.iter().filter(|s| s.scope.wants(&event)) {
            if s.outbox.is_closed() || s.queue.send(event.clone()).is_err() {
                saw_closed = true;
            }
        }
        if saw_closed {
            subs.retain(|s| !s.is_gone());
        }
    }
}

/// Moves queued events into the viewer's bounded channel, in order, until
/// either side goes away.
async fn forward_events(
    mut inbox: mpsc::UnboundedReceiver<ChatEvent>,
    outbox: mpsc::Sender<ChatEvent>,
    viewer_id: String,
) {
    loop {
        tokio::select! {
            next = inbox.recv() => {
                let Some(event) = next else { break };
                if outbox.send(event).await.is_err() {
                    break;
                }
            }
            _ = outbox.closed() => break,
        }
    }
    trace!("Event forwarder for viewer {} finished", viewer_id);
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
