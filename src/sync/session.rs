//! Login-session boundary and the notification dedup set scoped to it.
//!
//! This is the only place that decides whether persisted dedup state may be
//! reused: it is restored only when its recorded owner matches the user that
//! is logged in now, otherwise it is discarded before a fresh session starts.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use super::clock::Clock;
use crate::error::StorageError;
use crate::storage::Storage;

pub const KEY_SESSION_START: &str = "ratings_notif_session_start";
pub const KEY_SHOWN_IDS: &str = "ratings_notif_shown_ids";
pub const KEY_LAST_CHECK: &str = "ratings_notif_last_check";
pub const KEY_SESSION_USER: &str = "ratings_notif_session_user";

/// Written and removed together.
pub const SESSION_KEYS: [&str; 4] = [
    KEY_SESSION_START,
    KEY_SHOWN_IDS,
    KEY_LAST_CHECK,
    KEY_SESSION_USER,
];

/// Append-only set of event IDs already rendered in this session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSet {
    ids: HashSet<String>,
    /// Insertion order, for stable persistence.
    order: Vec<String>,
}

impl DedupSet {
    /// Returns `true` when the ID was not present before.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.order.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl FromIterator<String> for DedupSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = DedupSet::default();
        for id in iter {
            set.insert(&id);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    owner_user_id: String,
    /// Nothing created before this instant may surface in the session.
    started_at: DateTime<Utc>,
    last_checked_at: DateTime<Utc>,
    seen: DedupSet,
}

impl Session {
    fn new(owner_user_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            owner_user_id: owner_user_id.to_string(),
            started_at,
            last_checked_at: started_at,
            seen: DedupSet::default(),
        }
    }

    pub fn owner_user_id(&self) -> &str {
        &self.owner_user_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_checked_at(&self) -> DateTime<Utc> {
        self.last_checked_at
    }

    pub fn has_seen(&self, event_id: &str) -> bool {
        self.seen.contains(event_id)
    }

    pub fn seen(&self) -> &DedupSet {
        &self.seen
    }
}

pub struct SessionStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    session: Option<Session>,
    /// Cleared on the first storage failure; the store then lives in memory
    /// only for the rest of its lifetime.
    persistent: bool,
    epoch: u64,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            session: None,
            persistent: true,
            epoch: 0,
        }
    }

    /// Resume the persisted session of `current_user_id`, or start a new one.
    pub fn load_or_start(&mut self, current_user_id: &str) -> &Session {
        let active = self
            .session
            .take()
            .filter(|session| session.owner_user_id == current_user_id);

        let session = match active {
            Some(session) => session,
            None => {
                let session = match self.read_persisted(current_user_id) {
                    Some(session) => {
                        log::info!(
                            "Resumed notification session for {current_user_id} ({} seen)",
                            session.seen.len()
                        );
                        session
                    }
                    None => {
                        self.discard_persisted();
                        let session = Session::new(current_user_id, self.clock.now());
                        self.persist_session(&session);
                        log::info!(
                            "Started notification session for {current_user_id} at {}",
                            session.started_at
                        );
                        session
                    }
                };
                self.epoch += 1;
                session
            }
        };

        self.session.insert(session)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Bumped every time the session is replaced or cleared.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn has_seen(&self, event_id: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.has_seen(event_id))
    }

    /// Returns `true` when the ID was new. No-op without a session.
    pub fn record_seen(&mut self, event_id: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.seen.insert(event_id) {
            return false;
        }
        let encoded = serde_json::to_string(&session.seen.order);
        match encoded {
            Ok(encoded) => self.write(KEY_SHOWN_IDS, &encoded),
            Err(err) => self.degrade(&StorageError::from(err)),
        }
        true
    }

    /// Move the poll cursor forward. Earlier timestamps are ignored.
    pub fn advance_cursor(&mut self, to: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let session = self.session.as_mut()?;
        if to > session.last_checked_at {
            session.last_checked_at = to;
            let encoded = format_ts(to);
            self.write(KEY_LAST_CHECK, &encoded);
        }
        self.session.as_ref().map(|session| session.last_checked_at)
    }

    /// Drop the session and every persisted key (explicit logout).
    pub fn clear(&mut self) {
        if self.session.take().is_some() {
            log::info!("Cleared notification session");
        }
        self.epoch += 1;
        self.discard_persisted();
    }

    fn read_persisted(&mut self, current_user_id: &str) -> Option<Session> {
        if !self.persistent {
            return None;
        }
        match self.try_read_persisted(current_user_id) {
            Ok(session) => session,
            Err(err) => {
                self.degrade(&err);
                None
            }
        }
    }

    fn try_read_persisted(&self, current_user_id: &str) -> Result<Option<Session>, StorageError> {
        let owner = self.storage.get(KEY_SESSION_USER)?;
        if owner.as_deref() != Some(current_user_id) {
            return Ok(None);
        }
        let Some(started_at) = self.storage.get(KEY_SESSION_START)?.and_then(|raw| parse_ts(&raw))
        else {
            return Ok(None);
        };
        let seen = match self.storage.get(KEY_SHOWN_IDS)? {
            Some(raw) => serde_json::from_str::<Vec<String>>(&raw)?
                .into_iter()
                .collect(),
            None => DedupSet::default(),
        };
        let last_checked_at = self
            .storage
            .get(KEY_LAST_CHECK)?
            .and_then(|raw| parse_ts(&raw))
            .filter(|ts| *ts >= started_at)
            .unwrap_or(started_at);

        Ok(Some(Session {
            owner_user_id: current_user_id.to_string(),
            started_at,
            last_checked_at,
            seen,
        }))
    }

    fn persist_session(&mut self, session: &Session) {
        self.write(KEY_SESSION_USER, &session.owner_user_id);
        self.write(KEY_SESSION_START, &format_ts(session.started_at));
        self.write(KEY_LAST_CHECK, &format_ts(session.last_checked_at));
        self.write(KEY_SHOWN_IDS, "[]");
    }

    /// Attempted even after the store degraded: keys written before the
    /// failure must not outlive the session.
    fn discard_persisted(&mut self) {
        let mut failure = None;
        for key in SESSION_KEYS {
            if let Err(err) = self.storage.remove(key) {
                log::warn!("Failed to remove {key} from session storage: {err}");
                failure = Some(err);
            }
        }
        if let Some(err) = failure {
            self.degrade(&err);
        }
    }

    fn write(&mut self, key: &str, value: &str) {
        if !self.persistent {
            return;
        }
        if let Err(err) = self.storage.set(key, value) {
            self.degrade(&err);
        }
    }

    fn degrade(&mut self, err: &StorageError) {
        if self.persistent {
            log::warn!("Session storage unavailable ({err}); keeping session in memory only");
            self.persistent = false;
        }
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
