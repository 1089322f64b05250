use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{Mailbox, StoreError, Uid};

/// Counts of mailbox round-trips, by primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub searches: usize,
    pub fetches: usize,
    pub appends: usize,
    pub deletes: usize,
}

impl MailboxStats {
    /// Total number of round-trips.
    pub fn total(&self) -> usize {
        self.searches + self.fetches + self.appends + self.deletes
    }
}

#[derive(Debug, Clone)]
struct Message {
    subject: String,
    body: Bytes,
    appended_at: SystemTime,
    deleted: bool,
}

#[derive(Debug)]
struct State {
    messages: BTreeMap<u64, Message>,
    next_uid: u64,
    report_uids: bool,
    offline: bool,
    stats: MailboxStats,
}

/// Mailbox held entirely in process memory.
///
/// Clones share the same messages, so a test can keep one handle for
/// inspection while the filesystem owns another.
#[derive(Debug, Clone)]
pub struct MemoryMailbox(Arc<Mutex<State>>);

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailbox {
    pub fn new() -> Self {
        MemoryMailbox(Arc::new(Mutex::new(State {
            messages: BTreeMap::new(),
            next_uid: 1,
            report_uids: true,
            offline: false,
            stats: MailboxStats::default(),
        })))
    }

    /// A mailbox that does not report uids on append, like an IMAP
    /// server without UIDPLUS.
    pub fn without_append_uids() -> Self {
        let mailbox = Self::new();
        mailbox.0.lock().report_uids = false;
        mailbox
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.0.lock().offline = offline;
    }

    pub fn stats(&self) -> MailboxStats {
        self.0.lock().stats
    }

    /// Every version ever appended under `subject`, with its deleted flag.
    pub fn versions(&self, subject: &str) -> Vec<(Uid, bool)> {
        self.0
            .lock()
            .messages
            .iter()
            .filter(|(_, m)| m.subject == subject)
            .map(|(uid, m)| (Uid(*uid), m.deleted))
            .collect()
    }

    /// Number of live (not deleted) messages.
    pub fn live_count(&self) -> usize {
        self.0
            .lock()
            .messages
            .values()
            .filter(|m| !m.deleted)
            .count()
    }

    /// Append raw content directly, bypassing the stats. For seeding
    /// fixtures such as foreign mail or corrupt nodes.
    pub fn insert_raw(&self, subject: &str, body: &[u8]) -> Uid {
        let mut state = self.0.lock();
        let uid = state.next_uid;
        state.next_uid += 1;
        state.messages.insert(
            uid,
            Message {
                subject: subject.to_string(),
                body: Bytes::copy_from_slice(body),
                appended_at: SystemTime::now(),
                deleted: false,
            },
        );
        Uid(uid)
    }

    fn check_online(state: &State) -> Result<(), StoreError> {
        if state.offline {
            return Err(StoreError::Unavailable("mailbox is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Mailbox for MemoryMailbox {
    async fn search(&self, subject: &str) -> Result<Vec<Uid>, StoreError> {
        let mut state = self.0.lock();
        Self::check_online(&state)?;
        state.stats.searches += 1;
        Ok(state
            .messages
            .iter()
            .filter(|(_, m)| !m.deleted && m.subject == subject)
            .map(|(uid, _)| Uid(*uid))
            .collect())
    }

    async fn fetch(&self, uid: Uid) -> Result<Option<Bytes>, StoreError> {
        let mut state = self.0.lock();
        Self::check_online(&state)?;
        state.stats.fetches += 1;
        Ok(state
            .messages
            .get(&uid.0)
            .filter(|m| !m.deleted)
            .map(|m| m.body.clone()))
    }

    async fn internal_date(&self, uid: Uid) -> Result<Option<SystemTime>, StoreError> {
        let state = self.0.lock();
        Self::check_online(&state)?;
        Ok(state
            .messages
            .get(&uid.0)
            .filter(|m| !m.deleted)
            .map(|m| m.appended_at))
    }

    async fn append(&self, subject: &str, body: Bytes) -> Result<Option<Uid>, StoreError> {
        let mut state = self.0.lock();
        Self::check_online(&state)?;
        state.stats.appends += 1;
        let uid = state.next_uid;
        state.next_uid += 1;
        state.messages.insert(
            uid,
            Message {
                subject: subject.to_string(),
                body,
                appended_at: SystemTime::now(),
                deleted: false,
            },
        );
        Ok(state.report_uids.then_some(Uid(uid)))
    }

    async fn mark_deleted(&self, uid: Uid) -> Result<(), StoreError> {
        let mut state = self.0.lock();
        Self::check_online(&state)?;
        state.stats.deletes += 1;
        if let Some(message) = state.messages.get_mut(&uid.0) {
            message.deleted = true;
        }
        Ok(())
    }

    async fn subjects(&self) -> Result<Vec<(String, Uid)>, StoreError> {
        let state = self.0.lock();
        Self::check_online(&state)?;
        Ok(state
            .messages
            .iter()
            .filter(|(_, m)| !m.deleted)
            .map(|(uid, m)| (m.subject.clone(), Uid(*uid)))
            .collect())
    }

    async fn expunge(&self) -> Result<usize, StoreError> {
        let mut state = self.0.lock();
        Self::check_online(&state)?;
        let before = state.messages.len();
        state.messages.retain(|_, m| !m.deleted);
        Ok(before - state.messages.len())
    }
}
