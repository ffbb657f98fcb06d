//! Session-scoped vote locks
//!
//! A vote lock is a boolean flag in the voting actor's session. Session
//! lifetime is owned by whoever hands out the session; the rating store only
//! reads, claims and sets flags.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Key-value view of one actor's session
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Whether the flag `key` is set for this session
    fn get(&self, key: &str) -> bool;

    /// Set the flag `key` for this session
    fn set(&self, key: &str, value: bool);

    /// Atomically set `key` if it is unset; returns false when it was already set
    fn try_claim(&self, key: &str) -> bool;
}

/// Flags of a single session
#[derive(Debug)]
pub struct SessionState {
    flags: RwLock<HashSet<String>>,
    last_seen: Mutex<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            flags: RwLock::new(HashSet::new()),
            last_seen: Mutex::new(Utc::now()),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flags.read().map(|flags| flags.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last time the session was handed out
    pub fn last_seen(&self) -> DateTime<Utc> {
        match self.last_seen.lock() {
            Ok(last_seen) => *last_seen,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn touch(&self, now: DateTime<Utc>) {
        match self.last_seen.lock() {
            Ok(mut last_seen) => *last_seen = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }
}

impl SessionStore for SessionState {
    fn get(&self, key: &str) -> bool {
        match self.flags.read() {
            Ok(flags) => flags.contains(key),
            Err(_) => {
                warn!("Session flags lock poisoned, treating '{}' as unset", key);
                false
            }
        }
    }

    fn set(&self, key: &str, value: bool) {
        match self.flags.write() {
            Ok(mut flags) => {
                if value {
                    flags.insert(key.to_string());
                } else {
                    flags.remove(key);
                }
            }
            Err(_) => warn!("Session flags lock poisoned, dropping update of '{}'", key),
        }
    }

    fn try_claim(&self, key: &str) -> bool {
        match self.flags.write() {
            Ok(mut flags) => flags.insert(key.to_string()),
            Err(_) => {
                warn!("Session flags lock poisoned, refusing claim of '{}'", key);
                false
            }
        }
    }
}

/// Process-local registry of sessions keyed by session id
///
/// Sessions idle for longer than the TTL are dropped by [`prune_expired`].
///
/// [`prune_expired`]: InMemorySessions::prune_expired
#[derive(Debug)]
pub struct InMemorySessions {
    sessions: RwLock<HashMap<String, Arc<SessionState>>>,
    ttl: Duration,
}

impl Default for InMemorySessions {
    fn default() -> Self {
        Self::with_ttl(Duration::hours(1))
    }
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the session `session_id`, creating an empty one on first use
    pub fn session(&self, session_id: &str) -> Arc<SessionState> {
        if let Some(session) = self.get_existing(session_id) {
            return session;
        }

        match self.sessions.write() {
            Ok(mut sessions) => {
                let session = sessions
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(SessionState::new()));
                session.touch(Utc::now());
                session.clone()
            }
            Err(_) => {
                warn!(
                    "Session registry lock poisoned, serving '{}' from a detached session",
                    session_id
                );
                Arc::new(SessionState::new())
            }
        }
    }

    /// Get the session `session_id` if it is registered, never creating one
    pub fn get_existing(&self, session_id: &str) -> Option<Arc<SessionState>> {
        let sessions = self.sessions.read().ok()?;
        let session = sessions.get(session_id)?;
        session.touch(Utc::now());
        Some(session.clone())
    }

    /// Drop sessions not seen since `now - ttl`, returning how many were removed
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut sessions = match self.sessions.write() {
            Ok(sessions) => sessions,
            Err(_) => {
                warn!("Session registry lock poisoned, skipping pruning");
                return 0;
            }
        };

        let before = sessions.len();
        sessions.retain(|_, session| session.last_seen() >= cutoff);
        let removed = before - sessions.len();

        if removed > 0 {
            debug!("Pruned {} idle sessions, {} remain", removed, sessions.len());
        }
        removed
    }

    pub fn prune_expired(&self) -> usize {
        self.prune_idle(Utc::now())
    }

    /// Number of registered sessions
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.len())
            .unwrap_or_default()
    }
}
