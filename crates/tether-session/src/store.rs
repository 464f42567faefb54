//! Server-side session store.
//!
//! The transport keys live sessions by the identifier carried in the
//! `Tether-Session-Id` header. The trait keeps backends pluggable; the
//! in-memory implementation stores everything behind `Arc<RwLock<>>` and is
//! suitable for development, testing, and single-instance deployments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::Session;

/// Error type for session store operations
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Maximum sessions limit reached: {0}")]
    MaxSessionsReached(usize),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Pluggable store of live sessions keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Add a freshly negotiated session
    async fn insert(&self, session: Session) -> Result<(), SessionStoreError>;

    /// Look up a session by id
    async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Remove a session, returning it so the caller can drain it
    async fn remove(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError>;

    /// Record activity so the idle sweep leaves the session alone
    async fn touch(&self, session_id: &str) -> Result<(), SessionStoreError>;

    /// Close and remove sessions idle longer than `max_idle`; returns their ids
    async fn expire_idle(&self, max_idle: Duration) -> Result<Vec<String>, SessionStoreError>;

    async fn session_count(&self) -> Result<usize, SessionStoreError>;
}

/// Shared handle to a session store
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Configuration for the in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum concurrent sessions (for memory management)
    pub max_sessions: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100_000,
        }
    }
}

struct StoredSession {
    session: Session,
    last_activity: Instant,
}

/// In-memory store of live sessions
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    config: InMemoryConfig,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn insert(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.config.max_sessions {
            return Err(SessionStoreError::MaxSessionsReached(
                self.config.max_sessions,
            ));
        }

        debug!(session_id = %session.id(), "storing session");
        sessions.insert(
            session.id().to_string(),
            StoredSession {
                session,
                last_activity: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|stored| stored.session.clone()))
    }

    async fn remove(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(session_id).map(|stored| stored.session);
        if removed.is_some() {
            debug!(session_id = %session_id, "removed session");
        }
        Ok(removed)
    }

    async fn touch(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(stored) => {
                stored.last_activity = Instant::now();
                Ok(())
            }
            None => Err(SessionStoreError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn expire_idle(&self, max_idle: Duration) -> Result<Vec<String>, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        let cutoff = Instant::now();

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, stored)| cutoff.duration_since(stored.last_activity) > max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &expired {
            if let Some(stored) = sessions.remove(session_id) {
                stored.session.close();
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "expired idle sessions");
        }
        Ok(expired)
    }

    async fn session_count(&self) -> Result<usize, SessionStoreError> {
        Ok(self.sessions.read().await.len())
    }
}
