//! In-memory session store
//!
//! Suitable for a single-instance deployment and for tests. Multi-instance
//! deployments should back [`SessionStore`] with a shared store instead.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::result::Result;
use crate::ports::SessionStore;

/// Length of a session secret in bytes
const SECRET_LEN: usize = 32;

/// In-memory [`SessionStore`] implementation
#[derive(Default)]
pub struct InMemorySessionStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create_secret(&self, session_id: &str) -> Result<String> {
        if let Some(secret) = self.secrets.read().await.get(session_id) {
            return Ok(secret.clone());
        }

        let mut secrets = self.secrets.write().await;
        // Re-check under the write lock; another task may have created it
        if let Some(secret) = secrets.get(session_id) {
            return Ok(secret.clone());
        }

        let bytes: [u8; SECRET_LEN] = rand::random();
        let secret = hex::encode(bytes);
        secrets.insert(session_id.to_string(), secret.clone());
        Ok(secret)
    }

    async fn get_secret(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.secrets.read().await.get(session_id).cloned())
    }

    async fn invalidate(&self, session_id: &str) -> Result<()> {
        self.secrets.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_secret_is_stable_per_session() {
        let store = InMemorySessionStore::new();
        let a = store.get_or_create_secret("sess-1").await.unwrap();
        let b = store.get_or_create_secret("sess-1").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_secrets() {
        let store = InMemorySessionStore::new();
        let a = store.get_or_create_secret("sess-1").await.unwrap();
        let b = store.get_or_create_secret("sess-2").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_invalidate_rotates_secret() {
        let store = InMemorySessionStore::new();
        let a = store.get_or_create_secret("sess-1").await.unwrap();
        store.invalidate("sess-1").await.unwrap();
        assert!(store.get_secret("sess-1").await.unwrap().is_none());
        let b = store.get_or_create_secret("sess-1").await.unwrap();
        assert_ne!(a, b);
    }
}
