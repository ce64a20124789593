//! Maps host-platform session ids to their live [`VoiceSession`].

use crate::{
    connection::{AgentConnection, ConnectionOptions},
    link::{AgentCredentials, Connector},
    session::{GlassesHost, VoiceSession},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns every live session. Each session gets its own [`AgentConnection`]
/// built from the shared connector and credentials.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    credentials: AgentCredentials,
    options: ConnectionOptions,
    sessions: Mutex<HashMap<String, VoiceSession>>,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: AgentCredentials,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            connector,
            credentials,
            options,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates and registers the session for `id` and shows its welcome screen.
    ///
    /// A session already registered under `id` is cleaned up and replaced.
    pub async fn on_session_start(&self, id: &str, host: Arc<dyn GlassesHost>) -> VoiceSession {
        let agent = AgentConnection::new(
            Arc::clone(&self.connector),
            self.credentials.clone(),
            self.options.clone(),
        );
        let session = VoiceSession::new(id, host, agent);

        let previous = self
            .sessions
            .lock()
            .await
            .insert(id.to_string(), session.clone());
        if let Some(previous) = previous {
            warn!(session_id = %id, "Session already registered; replacing it");
            previous.cleanup().await;
        }

        info!(session_id = %id, "New session created");
        session.initialize().await;
        session
    }

    /// Cleans up and forgets the session for `id`. Returns `false` if unknown.
    pub async fn on_session_end(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(session) => {
                session.cleanup().await;
                info!(session_id = %id, "Session ended");
                true
            }
            None => false,
        }
    }

    /// Cleans up `session` and forgets it if it is still the one registered
    /// under its id. A replacement registered since is left alone.
    ///
    /// Returns whether `session` was still registered.
    pub async fn release(&self, session: &VoiceSession) -> bool {
        let registered = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(session.id()) {
                Some(current) if current.ptr_eq(session) => {
                    sessions.remove(session.id());
                    true
                }
                _ => false,
            }
        };
        session.cleanup().await;
        if registered {
            info!(session_id = %session.id(), "Session released");
        } else {
            info!(session_id = %session.id(), "Released session was no longer registered");
        }
        registered
    }

    pub async fn get(&self, id: &str) -> Option<VoiceSession> {
        self.sessions.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Cleans up every session. Returns how many there were.
    pub async fn shutdown(&self) -> usize {
        let sessions: Vec<VoiceSession> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = sessions.len();
        info!(count, "Shutting down all sessions");
        for session in sessions {
            session.cleanup().await;
        }
        count
    }
}
