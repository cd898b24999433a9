//! In-memory fake for the session store (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::Session;
use crate::store::SessionStore;
use crate::Result;

/// In-memory session store backed by a `HashMap<id, Session>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn add_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().unwrap();
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        Ok(all)
    }
}
