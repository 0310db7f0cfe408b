// File: supportchat-core/src/services/chat_engine.rs

use std::sync::Arc;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use supportchat_common::Error;
use supportchat_common::models::{
    Audience, ChatMessage, ChatSession, MessagePage, SenderRole, SessionState, Viewer,
};
use supportchat_common::traits::{BotResponder, ChatArchive};

use crate::config::EngineConfig;
use crate::directory::{SessionDirectory, SessionEntry, SessionRecord, StaffFilter, WriteGuard};
use crate::eventbus::{ChatEvent, EventBus, SessionChange};
use crate::ledger::{self, MessageHistory, MessageLedger};
use crate::services::bot_dispatch;
use crate::state_machine::{SessionStateMachine, Transition};
use crate::unread::UnreadTracker;

/// What a viewer gets when it opens a conversation: the state at the moment
/// of joining plus a stream of everything committed afterwards.
pub struct JoinedSession {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
    pub events: mpsc::Receiver<ChatEvent>,
}

struct EngineInner {
    config: EngineConfig,
    directory: SessionDirectory,
    event_bus: Arc<EventBus>,
    bot: Option<Arc<dyn BotResponder>>,
    archive: Option<Arc<dyn ChatArchive>>,
}

/// The public surface of the chat core. Cheap to clone; clones share state.
///
/// Every mutation of a session runs under that session's write lock:
///  1. validate against the state machine,
///  2. write through to the archive (if any),
///  3. commit ledger + session fields as one unit,
///  4. publish the change, still under the lock, so observers see commit order.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

impl ChatEngine {
    pub fn new(
        config: EngineConfig,
        event_bus: Arc<EventBus>,
        bot: Option<Arc<dyn BotResponder>>,
        archive: Option<Arc<dyn ChatArchive>>,
    ) -> Self {
        debug!("ChatEngine::new() called (bot={}, archive={})", bot.is_some(), archive.is_some());
        Self {
            inner: Arc::new(EngineInner {
                config,
                directory: SessionDirectory::new(),
                event_bus,
                bot,
                archive,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.inner.directory
    }

    /// Reloads every archived session into the directory. Sessions already
    /// present are left alone. Returns how many were loaded.
    pub async fn restore(&self) -> Result<usize, Error> {
        let Some(archive) = &self.inner.archive else {
            return Ok(0);
        };
        let mut loaded = 0;
        for session in archive.load_sessions().await? {
            if self.inner.directory.contains(session.id) {
                continue;
            }
            let messages = archive.load_messages(session.id).await?;
            let ledger = MessageLedger::from_messages(session.id, messages)?;
            if let Err(violation) = SessionStateMachine::check_invariants(&session) {
                warn!("Restoring session with broken invariant: {}", violation);
            }
            self.inner
                .directory
                .insert(Arc::new(SessionEntry::new(SessionRecord { session, ledger })));
            loaded += 1;
        }
        info!("Restored {} chat session(s) from archive.", loaded);
        Ok(loaded)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Starts a bot-track session with the customer's first message.
    /// Fails with `AlreadyHasOpenSession` if the customer should rejoin instead.
    pub async fn create_session(
        &self,
        customer_id: &str,
        customer_display_name: &str,
        first_message: &str,
    ) -> Result<ChatSession, Error> {
        let customer_lock = self.inner.directory.customer_lock(customer_id);
        let created = {
            let _creating = customer_lock.lock().await;
            self.create_locked(customer_id, customer_display_name, first_message).await
        };
        drop(customer_lock);
        self.inner.directory.release_customer_lock(customer_id);

        let (session, message) = created?;
        self.maybe_dispatch_bot(SessionState::Bot, &message);
        Ok(session)
    }

    /// Appends a message. In bot mode a customer message also schedules an
    /// assistant reply, which arrives later through the event stream.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        sender_id: &str,
        sender_role: SenderRole,
        content: &str,
    ) -> Result<ChatMessage, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        let (session, message) = self.append_locked(&entry, &guard, sender_id, sender_role, content).await?;
        drop(guard);

        self.maybe_dispatch_bot(session.state(), &message);
        Ok(message)
    }

    /// BOT -> PENDING_HUMAN: puts the session into the staff queue.
    pub async fn request_human(&self, session_id: Uuid) -> Result<ChatSession, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        let next = SessionStateMachine::request_human(&entry.snapshot())?;
        self.commit_session(&entry, &guard, next.clone()).await?;
        info!("Session {} escalated to the staff queue", session_id);
        self.inner
            .event_bus
            .publish(ChatEvent::SessionUpdated { session: next.clone(), change: SessionChange::EscalationRequested })
            .await;
        drop(guard);

        self.forget_bot_state(session_id).await;
        Ok(next)
    }

    /// PENDING_HUMAN -> ACTIVE. Of several concurrent callers exactly one
    /// wins; the others get `AlreadyClaimed` naming the winner.
    pub async fn accept_session(&self, session_id: Uuid, staff_id: &str) -> Result<ChatSession, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        let next = match SessionStateMachine::accept(&entry.snapshot(), staff_id) {
            Ok(next) => next,
            Err(e) => {
                debug!("Accept of session {} by {} refused: {}", session_id, staff_id, e);
                return Err(e);
            }
        };
        self.commit_session(&entry, &guard, next.clone()).await?;
        info!("Session {} claimed by staff {}", session_id, staff_id);
        self.inner
            .event_bus
            .publish(ChatEvent::SessionUpdated { session: next.clone(), change: SessionChange::Claimed })
            .await;
        Ok(next)
    }

    /// Terminal transition. Closing a closed session returns it unchanged.
    pub async fn close_session(&self, session_id: Uuid) -> Result<ChatSession, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        self.close_locked(&entry, guard).await
    }

    /// Clears the audience's unread counter. Allowed on closed sessions.
    pub async fn acknowledge_read(&self, session_id: Uuid, audience: Audience) -> Result<ChatSession, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        self.acknowledge_locked(&entry, &guard, audience).await
    }

    /// Opens a conversation for a viewer: acknowledges their side as read,
    /// snapshots the ledger and subscribes, all inside the session's critical
    /// section so no change can fall between the snapshot and the stream.
    pub async fn join_session(&self, session_id: Uuid, viewer: &Viewer) -> Result<JoinedSession, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        let session = self.acknowledge_locked(&entry, &guard, viewer.audience).await?;
        let messages = entry.read(|rec| rec.ledger.messages().to_vec());
        let events = self.inner.event_bus.subscribe_session(viewer, session_id).await;
        drop(guard);

        debug!("Viewer {} ({}) joined session {}", viewer.viewer_id, viewer.audience, session_id);
        Ok(JoinedSession { session, messages, events })
    }

    /// Stops every event stream held by `viewer_id`. Does not touch session
    /// state and does not cancel anything already submitted.
    pub async fn leave_session(&self, viewer_id: &str) {
        let removed = self.inner.event_bus.unsubscribe_viewer(viewer_id).await;
        debug!("Viewer {} left ({} subscription(s) dropped)", viewer_id, removed);
    }

    /// Event stream over every session, for the staff console list.
    pub async fn watch_directory(&self, viewer_id: &str) -> mpsc::Receiver<ChatEvent> {
        self.inner.event_bus.subscribe_directory(viewer_id).await
    }

    /// Closes sessions that have waited in the staff queue, with no message,
    /// for longer than `idle_for`. The idle check is repeated under the
    /// session lock so a session claimed meanwhile is left alone.
    pub async fn close_idle_pending(&self, idle_for: chrono::Duration) -> Result<Vec<ChatSession>, Error> {
        let cutoff = Utc::now() - idle_for;
        let mut closed = Vec::new();
        for candidate in self.inner.directory.list_for_staff(&StaffFilter::pending()) {
            if candidate.last_message_at >= cutoff {
                continue;
            }
            let still_idle = |s: &ChatSession| {
                s.state() == SessionState::PendingHuman && s.last_message_at < cutoff
            };
            if let Some(session) = self.close_if(candidate.id, still_idle).await? {
                info!("Auto-closed idle pending session {}", session.id);
                closed.push(session);
            }
        }
        Ok(closed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_session(&self, session_id: Uuid) -> Result<ChatSession, Error> {
        self.inner
            .directory
            .get(session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    /// Messages with `seq > after`, oldest first.
    pub fn list_messages(
        &self,
        session_id: Uuid,
        after: Option<u64>,
        limit: Option<usize>,
    ) -> Result<MessagePage, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        Ok(entry.read(|rec| rec.ledger.page(after, limit)))
    }

    /// Restartable pager over the session's history, starting after `cursor`.
    pub fn message_history(
        &self,
        session_id: Uuid,
        cursor: Option<u64>,
        page_size: usize,
    ) -> Result<MessageHistory, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        Ok(MessageHistory::new(entry, cursor, page_size))
    }

    pub fn list_for_staff(&self, filter: &StaffFilter) -> Vec<ChatSession> {
        self.inner.directory.list_for_staff(filter)
    }

    pub fn list_for_customer(&self, customer_id: &str) -> Vec<ChatSession> {
        self.inner.directory.list_for_customer(customer_id)
    }

    pub fn find_current_for(&self, customer_id: &str) -> Option<ChatSession> {
        self.inner.directory.find_current_for(customer_id)
    }

    /// Viewers currently observing the session.
    pub async fn presence(&self, session_id: Uuid) -> Result<Vec<Viewer>, Error> {
        self.inner.directory.entry(session_id)?;
        Ok(self.inner.event_bus.viewers_of(session_id).await)
    }

    pub fn shutdown(&self) {
        info!("ChatEngine shutting down.");
        self.inner.event_bus.shutdown();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Appends on behalf of the assistant, but only while the session is still
    /// on the bot track. Returns `None` when the reply was discarded.
    pub(crate) async fn append_if_bot_track(
        &self,
        session_id: Uuid,
        sender_id: &str,
        sender_role: SenderRole,
        content: &str,
    ) -> Result<Option<ChatMessage>, Error> {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        let state = entry.snapshot().state();
        if state != SessionState::Bot {
            debug!("Discarding {} message for session {} in state {}", sender_role, session_id, state);
            return Ok(None);
        }
        let (_, message) = self.append_locked(&entry, &guard, sender_id, sender_role, content).await?;
        Ok(Some(message))
    }

    pub(crate) fn is_bot_track(&self, session_id: Uuid) -> bool {
        self.inner
            .directory
            .get(session_id)
            .map(|s| s.state() == SessionState::Bot)
            .unwrap_or(false)
    }

    async fn create_locked(
        &self,
        customer_id: &str,
        customer_display_name: &str,
        first_message: &str,
    ) -> Result<(ChatSession, ChatMessage), Error> {
        if let Some(existing) = self.inner.directory.find_current_for(customer_id) {
            debug!("Customer {} already has open session {}", customer_id, existing.id);
            return Err(Error::AlreadyHasOpenSession(existing.id));
        }

        let mut session = ChatSession::new(customer_id, customer_display_name);
        let mut ledger = MessageLedger::new(session.id);
        let message = ledger.draft(customer_id, SenderRole::Customer, first_message, Utc::now());
        ledger::apply_preview(&mut session, &message, self.inner.config.preview_chars);
        UnreadTracker::on_append(&mut session, SenderRole::Customer);

        if let Some(archive) = &self.inner.archive {
            archive.record_append(&session, &message).await?;
        }
        ledger.push(message.clone());

        let entry = Arc::new(SessionEntry::new(SessionRecord { session: session.clone(), ledger }));
        let guard = entry.lock().await;
        self.inner.directory.insert(entry.clone());
        info!("Created chat session {} for customer {}", session.id, customer_id);

        self.inner.event_bus.publish(ChatEvent::SessionCreated { session: session.clone() }).await;
        self.inner
            .event_bus
            .publish(ChatEvent::MessageAppended { session: session.clone(), message: message.clone() })
            .await;
        drop(guard);
        Ok((session, message))
    }

    async fn append_locked(
        &self,
        entry: &SessionEntry,
        guard: &WriteGuard<'_>,
        sender_id: &str,
        sender_role: SenderRole,
        content: &str,
    ) -> Result<(ChatSession, ChatMessage), Error> {
        let mut session = entry.snapshot();
        SessionStateMachine::ensure_accepts_messages(&session)?;

        let message = entry.read(|rec| rec.ledger.draft(sender_id, sender_role, content, Utc::now()));
        ledger::apply_preview(&mut session, &message, self.inner.config.preview_chars);
        UnreadTracker::on_append(&mut session, sender_role);

        if let Some(archive) = &self.inner.archive {
            archive.record_append(&session, &message).await?;
        }
        entry.commit(guard, |rec| {
            rec.ledger.push(message.clone());
            rec.session = session.clone();
        });

        self.inner
            .event_bus
            .publish(ChatEvent::MessageAppended { session: session.clone(), message: message.clone() })
            .await;
        Ok((session, message))
    }

    async fn acknowledge_locked(
        &self,
        entry: &SessionEntry,
        guard: &WriteGuard<'_>,
        audience: Audience,
    ) -> Result<ChatSession, Error> {
        let mut session = entry.snapshot();
        if !UnreadTracker::acknowledge(&mut session, audience) {
            return Ok(session);
        }
        self.commit_session(entry, guard, session.clone()).await?;
        self.inner
            .event_bus
            .publish(ChatEvent::ReadAcknowledged { session: session.clone(), audience })
            .await;
        Ok(session)
    }

    async fn commit_session(
        &self,
        entry: &SessionEntry,
        guard: &WriteGuard<'_>,
        session: ChatSession,
    ) -> Result<(), Error> {
        if let Some(archive) = &self.inner.archive {
            archive.save_session(&session).await?;
        }
        entry.commit(guard, |rec| rec.session = session);
        Ok(())
    }

    /// Closes the session if `pred` holds for its committed state;
    /// `Ok(None)` means `pred` refused.
    async fn close_if<P>(&self, session_id: Uuid, pred: P) -> Result<Option<ChatSession>, Error>
    where
        P: FnOnce(&ChatSession) -> bool,
    {
        let entry = self.inner.directory.entry(session_id)?;
        let guard = entry.lock().await;
        if !pred(&entry.snapshot()) {
            return Ok(None);
        }
        self.close_locked(&entry, guard).await.map(Some)
    }

    /// Takes the guard by value: the lock is released before the responder
    /// is told to forget the session.
    async fn close_locked(&self, entry: &SessionEntry, guard: WriteGuard<'_>) -> Result<ChatSession, Error> {
        let current = entry.snapshot();
        let next = match SessionStateMachine::close(&current, Utc::now()) {
            Transition::NoOp => {
                debug!("Session {} already closed", current.id);
                return Ok(current);
            }
            Transition::Applied(next) => next,
        };
        self.commit_session(entry, &guard, next.clone()).await?;
        info!("Session {} closed (was {})", next.id, current.state());
        self.inner
            .event_bus
            .publish(ChatEvent::SessionUpdated { session: next.clone(), change: SessionChange::Closed })
            .await;
        drop(guard);

        if current.state() == SessionState::Bot {
            self.forget_bot_state(next.id).await;
        }
        Ok(next)
    }

    fn maybe_dispatch_bot(&self, state: SessionState, message: &ChatMessage) {
        let Some(responder) = &self.inner.bot else {
            return;
        };
        if bot_dispatch::should_trigger(message.sender_role, state) {
            bot_dispatch::spawn_bot_reply(self.clone(), responder.clone(), message.clone());
        }
    }

    async fn forget_bot_state(&self, session_id: Uuid) {
        if let Some(responder) = &self.inner.bot {
            responder.forget_session(session_id).await;
        }
    }
}
