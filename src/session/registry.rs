//! Active-session table and the per-run ticket that owns a table entry.
//!
//! A ticket is the only way to hold an entry. Dropping it destroys the attached
//! provider session (if any) and removes the entry, so teardown happens exactly
//! once on every exit path.

use super::state::SessionState;
use crate::error::ApiError;
use crate::provider::ProviderSession;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct ActiveEntry {
    nonce: u64,
    cancel: Arc<AtomicBool>,
    state: SessionState,
    created_at: DateTime<Utc>,
}

/// Snapshot of an active session
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct ActiveSessions {
    entries: Arc<Mutex<HashMap<String, ActiveEntry>>>,
    nonces: Arc<AtomicU64>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`. Fails while another run holds the same id.
    pub fn reserve(&self, session_id: &str) -> Result<SessionTicket, ApiError> {
        let nonce = self.nonces.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut entries = self.entries.lock();
            if entries.contains_key(session_id) {
                return Err(ApiError::DuplicateSession(session_id.to_string()));
            }
            entries.insert(
                session_id.to_string(),
                ActiveEntry {
                    nonce,
                    cancel: cancel.clone(),
                    state: SessionState::Created,
                    created_at: Utc::now(),
                },
            );
        }
        debug!(session_id = %session_id, "Session reserved");
        Ok(SessionTicket {
            session_id: session_id.to_string(),
            nonce,
            cancel,
            handle: None,
            table: self.clone(),
        })
    }

    /// Flag an active session for cancellation; false when nothing is active under the id.
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.entries.lock().get(session_id) {
            Some(entry) => {
                entry.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.entries.lock().contains_key(session_id)
    }

    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        self.entries.lock().get(session_id).map(|e| e.state)
    }

    pub fn info(&self, session_id: &str) -> Option<ActiveSessionInfo> {
        self.entries
            .lock()
            .get(session_id)
            .map(|entry| ActiveSessionInfo {
                session_id: session_id.to_string(),
                state: entry.state,
                cancel_requested: entry.cancel.load(Ordering::SeqCst),
                created_at: entry.created_at,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_state(&self, session_id: &str, nonce: u64, next: SessionState) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(session_id) {
            if entry.nonce != nonce {
                return;
            }
            if entry.state.can_advance_to(next) {
                debug!(session_id = %session_id, from = %entry.state, to = %next, "Session state");
                entry.state = next;
            } else if entry.state != next {
                warn!(session_id = %session_id, from = %entry.state, to = %next, "Ignoring invalid session transition");
            }
        }
    }

    fn release(&self, session_id: &str, nonce: u64) {
        let mut entries = self.entries.lock();
        if entries.get(session_id).map(|e| e.nonce) == Some(nonce) {
            entries.remove(session_id);
        }
    }
}

/// Ownership of one active-session entry for the duration of a run.
pub struct SessionTicket {
    session_id: String,
    nonce: u64,
    cancel: Arc<AtomicBool>,
    handle: Option<Box<dyn ProviderSession>>,
    table: ActiveSessions,
}

impl SessionTicket {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn advance(&self, next: SessionState) {
        self.table.set_state(&self.session_id, self.nonce, next);
    }

    /// Hand the provider session to the ticket; it is destroyed when the ticket drops.
    pub fn attach(&mut self, handle: Box<dyn ProviderSession>) {
        self.handle = Some(handle);
    }

    pub fn provider_session(&self) -> Option<&dyn ProviderSession> {
        self.handle.as_deref()
    }
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.destroy();
            debug!(session_id = %self.session_id, "Provider session destroyed");
        }
        self.table.release(&self.session_id, self.nonce);
    }
}
