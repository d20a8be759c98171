//! Session module - per-conversation message history
//!
//! This module provides the in-memory [`SessionStore`] used by multi-turn
//! callers:
//! - lazy TTL expiry, swept on access (no background task)
//! - round-based trimming of long histories
//! - explicit reset
//!
//! # Example
//!
//! ```
//! use dst_ai_gateway::session::SessionStore;
//! use std::time::Duration;
//!
//! let store = SessionStore::new(2, Some(Duration::from_secs(3600)));
//! store.append_turn("group:1", "how do I roll back?", "use the rollback command");
//! assert_eq!(store.history("group:1").len(), 2);
//! ```

pub mod types;

pub use types::{ChatMessage, ChatSession, Role};

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::AiConfig;
use crate::log_component;

/// Session store keyed by conversation id.
///
/// # Thread Safety
///
/// All reads and writes go through one `Mutex` that is held only for the map
/// operation itself. No method is async, so the lock can never be held across
/// a suspension point.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, ChatSession>>,
    /// Rounds (user + assistant pairs) kept per session; 0 keeps everything
    max_rounds: usize,
    /// Idle time after which a session is dropped; `None` never expires
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Create a store. A `ttl` of `None` or zero means sessions never expire.
    pub fn new(max_rounds: usize, ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_rounds,
            ttl: ttl.filter(|t| !t.is_zero()),
        }
    }

    /// Create a store from `session_max_rounds` / `session_ttl_seconds`.
    pub fn from_config(config: &AiConfig) -> Self {
        Self::new(
            config.session_max_rounds,
            Some(Duration::from_secs(config.session_ttl_seconds)),
        )
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChatSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, session: &ChatSession, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(session.last_active) >= ttl,
            None => false,
        }
    }

    fn sweep(&self, sessions: &mut HashMap<String, ChatSession>, now: Instant) {
        if self.ttl.is_none() {
            return;
        }
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        let removed = before - sessions.len();
        if removed > 0 {
            log_component!(debug, "session", "Swept expired sessions", removed = removed);
        }
    }

    /// Fetch the live session for `id`, replacing an expired or missing one
    /// with a fresh empty session.
    fn live_session<'a>(
        &self,
        sessions: &'a mut HashMap<String, ChatSession>,
        id: &str,
    ) -> &'a mut ChatSession {
        let now = Instant::now();
        self.sweep(sessions, now);
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| ChatSession::new(id));
        session.touch();
        session
    }

    /// Get an existing session or create a new one.
    ///
    /// Sweeps expired sessions across the whole store first. Returns a
    /// snapshot; mutate through [`append_turn`](Self::append_turn) or
    /// [`append_message`](Self::append_message).
    pub fn get_or_create(&self, id: &str) -> ChatSession {
        let mut sessions = self.lock();
        self.live_session(&mut sessions, id).clone()
    }

    /// History of `id`, oldest first. Empty when absent or expired.
    pub fn history(&self, id: &str) -> Vec<ChatMessage> {
        let mut sessions = self.lock();
        self.sweep(&mut sessions, Instant::now());
        match sessions.get_mut(id) {
            Some(session) => {
                session.touch();
                session.messages.clone()
            }
            None => Vec::new(),
        }
    }

    /// Record one completed exchange and trim to the most recent rounds.
    pub fn append_turn(&self, id: &str, user_text: &str, assistant_text: &str) {
        let mut sessions = self.lock();
        let session = self.live_session(&mut sessions, id);
        session.messages.push(ChatMessage::user(user_text));
        session.messages.push(ChatMessage::assistant(assistant_text));
        session.trim_to_rounds(self.max_rounds);
    }

    /// Append a single message, with the same trimming rule as `append_turn`.
    pub fn append_message(&self, id: &str, role: Role, content: &str) {
        let mut sessions = self.lock();
        let session = self.live_session(&mut sessions, id);
        session.messages.push(ChatMessage::new(role, content));
        session.trim_to_rounds(self.max_rounds);
    }

    /// Remove a session entirely.
    pub fn reset(&self, id: &str) {
        if self.lock().remove(id).is_some() {
            log_component!(debug, "session", "Session reset", session = id);
        }
    }

    /// Number of stored sessions (expired ones included until the next sweep).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
