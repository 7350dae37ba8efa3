use async_trait::async_trait;
use authcore::store::error::{Result, StoreError};
use authcore::store::traits::{AuthBlobStore, SessionRowStore};
use authcore::types::session::SessionRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A simple in-memory backend for tests and ephemeral deployments.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    auth_states: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRowStore for InMemoryBackend {
    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id).cloned())
    }

    async fn get_session_by_owner(&self, owner_id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().find(|s| s.owner_id == owner_id).cloned())
    }

    async fn insert_session_if_absent(&self, record: SessionRecord) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.values().find(|s| s.owner_id == record.owner_id) {
            return Ok(existing.clone());
        }
        sessions.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_session(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("session {}", record.id))),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<_> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}

#[async_trait]
impl AuthBlobStore for InMemoryBackend {
    async fn load_auth_state(&self, session_id: &str) -> Result<Option<String>> {
        let auth_states = self.auth_states.read().await;
        Ok(auth_states.get(session_id).cloned())
    }

    async fn store_auth_state(&self, session_id: &str, encoded: &str) -> Result<()> {
        let mut auth_states = self.auth_states.write().await;
        auth_states.insert(session_id.to_string(), encoded.to_string());
        Ok(())
    }

    async fn delete_auth_state(&self, session_id: &str) -> Result<()> {
        let mut auth_states = self.auth_states.write().await;
        auth_states.remove(session_id);
        Ok(())
    }
}
