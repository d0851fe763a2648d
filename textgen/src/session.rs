//! Session registry.
//!
//! Each session owns one [`Conversation`] behind an async mutex. Whoever holds
//! the lock owns the conversation; a second request while it is held is
//! rejected with [`SessionError::Busy`] rather than queued. Generations also
//! register a cancellation token that [`Session::stop`] triggers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::Conversation;
use crate::types::{SessionError, SessionId};

/// Default cap on concurrently open sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Exclusive access to a session's conversation.
pub type ConversationGuard = OwnedMutexGuard<Conversation>;

pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    conversation: Arc<Mutex<Conversation>>,
    cancel: std::sync::Mutex<CancellationToken>,
}

/// Summary returned when listing sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub busy: bool,
}

impl Session {
    fn new(conversation: Conversation) -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            conversation: Arc::new(Mutex::new(conversation)),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            created_at: self.created_at,
            busy: self.is_busy(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.conversation.try_lock().is_err()
    }

    /// Take the conversation for an edit or a read.
    pub fn lock(&self) -> Result<ConversationGuard, SessionError> {
        self.conversation
            .clone()
            .try_lock_owned()
            .map_err(|_| SessionError::Busy(self.id.to_string()))
    }

    /// Take the conversation for a generation and arm a fresh cancellation token.
    pub fn begin_generation(&self) -> Result<(ConversationGuard, CancellationToken), SessionError> {
        let guard = self.lock()?;
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        debug!("Session {} started a generation", self.id);
        Ok((guard, token))
    }

    /// Ask the running generation, if any, to stop at its next increment.
    pub fn stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        debug!("Session {} asked to stop", self.id);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    max_sessions: usize,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
        }
    }

    pub async fn create_session(
        &self,
        conversation: Conversation,
    ) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            warn!("Session limit reached: {}", self.max_sessions);
            return Err(SessionError::LimitExceeded);
        }

        let session = Arc::new(Session::new(conversation));
        sessions.insert(session.id, session.clone());
        info!("Created session {}", session.id);
        Ok(session)
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Remove a session, stopping its generation. Returns false if it did not exist.
    pub async fn delete_session(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.stop();
                info!("Deleted session {}", id);
                true
            }
            None => false,
        }
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
