//! Session store port - per-session CSRF secrets
//!
//! CSRF secrets are session-scoped state behind a trait so multi-instance
//! deployments can back them with a shared store instead of process memory.

use async_trait::async_trait;

use crate::domain::result::Result;

/// Storage for per-session CSRF secrets
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session's secret, creating and caching one on first use
    async fn get_or_create_secret(&self, session_id: &str) -> Result<String>;

    /// Return the session's secret if one exists
    async fn get_secret(&self, session_id: &str) -> Result<Option<String>>;

    /// Drop the session's secret (e.g. on logout); previously derived
    /// tokens stop verifying
    async fn invalidate(&self, session_id: &str) -> Result<()>;
}
