// File: supportchat-core/src/directory.rs

use std::cmp::Ordering;
use std::sync::Arc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use supportchat_common::Error;
use supportchat_common::models::{ChatSession, SessionMode, SessionStatus};
use crate::ledger::MessageLedger;

/// Committed state of one session: the session row plus its ledger.
/// Both live behind one lock so readers never see one without the other.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: ChatSession,
    pub ledger: MessageLedger,
}

/// Per-session cell.
///
/// `write_lock` serializes every mutation of the session (append, accept,
/// close, request-human, read acknowledgement) and may be held across awaits
/// (archive writes, event fan-out). `record` is only ever held for the
/// duration of a copy or a swap, so reads never wait on a slow writer.
pub struct SessionEntry {
    session_id: Uuid,
    write_lock: Mutex<()>,
    record: RwLock<SessionRecord>,
}

/// Proof that the caller holds a session's write lock.
pub struct WriteGuard<'a> {
    session_id: Uuid,
    _guard: MutexGuard<'a, ()>,
}

impl SessionEntry {
    pub fn new(record: SessionRecord) -> Self {
        Self {
            session_id: record.session.id,
            write_lock: Mutex::new(()),
            record: RwLock::new(record),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            session_id: self.session_id,
            _guard: self.write_lock.lock().await,
        }
    }

    pub fn snapshot(&self) -> ChatSession {
        self.record.read().session.clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&SessionRecord) -> R) -> R {
        f(&self.record.read())
    }

    /// Applies a change as one atomic unit with respect to readers.
    pub fn commit<R>(&self, guard: &WriteGuard<'_>, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        debug_assert_eq!(guard.session_id, self.session_id);
        f(&mut self.record.write())
    }
}

/// Staff console query. `None` fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaffFilter {
    pub status: Option<SessionStatus>,
    pub mode: Option<SessionMode>,
    pub assigned_to: Option<String>,
}

impl StaffFilter {
    /// Every session, closed history included.
    pub fn all() -> Self {
        Self::default()
    }

    /// The queue: sessions waiting for an agent.
    pub fn pending() -> Self {
        Self { status: Some(SessionStatus::Pending), ..Self::default() }
    }

    /// Sessions currently owned by `staff_id`.
    pub fn active_for(staff_id: &str) -> Self {
        Self {
            status: Some(SessionStatus::Active),
            assigned_to: Some(staff_id.to_string()),
            ..Self::default()
        }
    }

    pub fn matches(&self, session: &ChatSession) -> bool {
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        if let Some(mode) = self.mode {
            if session.mode != mode {
                return false;
            }
        }
        if let Some(staff) = &self.assigned_to {
            if session.assigned_staff_id.as_deref() != Some(staff.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Most recent activity first; ties go to the newer session.
fn by_recency(a: &ChatSession, b: &ChatSession) -> Ordering {
    b.last_message_at
        .cmp(&a.last_message_at)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// All sessions, indexed by id and by customer.
pub struct SessionDirectory {
    sessions: DashMap<Uuid, Arc<SessionEntry>>,
    by_customer: DashMap<String, Vec<Uuid>>,
    customer_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_customer: DashMap::new(),
            customer_locks: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Registers an entry. The caller should already hold its write lock when
    /// the session is brand new, so nothing can act on it before its creation
    /// events are out.
    pub fn insert(&self, entry: Arc<SessionEntry>) {
        let (session_id, customer_id) = entry.read(|rec| (rec.session.id, rec.session.customer_id.clone()));
        self.sessions.insert(session_id, entry);
        let mut ids = self.by_customer.entry(customer_id).or_default();
        if !ids.contains(&session_id) {
            ids.push(session_id);
        }
    }

    pub fn entry(&self, session_id: Uuid) -> Result<Arc<SessionEntry>, Error> {
        self.sessions
            .get(&session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }

    pub fn get(&self, session_id: Uuid) -> Option<ChatSession> {
        self.sessions.get(&session_id).map(|e| e.value().snapshot())
    }

    /// Lock serializing session creation for one customer, so the
    /// "already has an open session" check and the insert cannot interleave.
    pub fn customer_lock(&self, customer_id: &str) -> Arc<Mutex<()>> {
        self.customer_locks
            .entry(customer_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Drops the customer's creation lock once nobody else holds a handle to
    /// it. Call after releasing the handle returned by `customer_lock`.
    pub fn release_customer_lock(&self, customer_id: &str) {
        self.customer_locks
            .remove_if(customer_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub fn customer_lock_count(&self) -> usize {
        self.customer_locks.len()
    }

    pub fn list_for_staff(&self, filter: &StaffFilter) -> Vec<ChatSession> {
        let mut out: Vec<ChatSession> = self
            .sessions
            .iter()
            .map(|e| e.value().snapshot())
            .filter(|s| filter.matches(s))
            .collect();
        out.sort_by(by_recency);
        out
    }

    pub fn list_for_customer(&self, customer_id: &str) -> Vec<ChatSession> {
        let ids = match self.by_customer.get(customer_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };
        let mut out: Vec<ChatSession> = ids.into_iter().filter_map(|id| self.get(id)).collect();
        out.sort_by(by_recency);
        out
    }

    /// The conversation a returning customer should land back in: the most
    /// recently active non-closed session, ties broken by newest `created_at`.
    pub fn find_current_for(&self, customer_id: &str) -> Option<ChatSession> {
        self.list_for_customer(customer_id)
            .into_iter()
            .find(|s| !s.is_closed())
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}
