//! CSRF service - double-submit token issuance and verification
//!
//! Each session gets one random secret, held server-side in the session
//! store and never transmitted. Tokens are derived from the secret with a
//! keyed MAC, so one secret validates any number of outstanding tokens
//! without per-token storage. Tokens stay valid until the session secret
//! changes.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::SecurityConfig;
use crate::domain::result::{CsrfReason, Error, Result};
use crate::ports::SessionStore;

type HmacSha256 = Hmac<Sha256>;

/// Length of the random salt prefixed to each token, in bytes
const SALT_LEN: usize = 8;

/// Separator between the salt and MAC halves of a token
const TOKEN_SEPARATOR: char = '.';

/// Methods that never mutate state and bypass verification
const SAFE_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS"];

/// Service for CSRF protection of state-changing requests
pub struct CsrfService {
    sessions: Arc<dyn SessionStore>,
    /// Process-wide keying material mixed into every MAC, from
    /// [`SecurityConfig`]
    server_secret: String,
}

impl CsrfService {
    pub fn new(sessions: Arc<dyn SessionStore>, config: &SecurityConfig) -> Self {
        Self {
            sessions,
            server_secret: config.session_secret.clone(),
        }
    }

    /// Issue a token for the caller's session, creating the session secret
    /// on first use. This is the bootstrap path and must not itself require
    /// a token.
    pub async fn issue_token(&self, session_id: &str) -> Result<String> {
        let secret = self.sessions.get_or_create_secret(session_id).await?;
        self.create_token(&secret)
    }

    /// Derive a fresh token from a session secret
    pub fn create_token(&self, secret: &str) -> Result<String> {
        let salt: [u8; SALT_LEN] = rand::random();
        let mac = self.mac(secret, &salt)?;
        Ok(format!(
            "{}{}{}",
            hex::encode(salt),
            TOKEN_SEPARATOR,
            hex::encode(mac)
        ))
    }

    /// Verify a token against a session secret
    pub fn verify_token(&self, secret: &str, token: &str) -> bool {
        let Some((salt_hex, mac_hex)) = token.split_once(TOKEN_SEPARATOR) else {
            return false;
        };
        let Ok(salt) = hex::decode(salt_hex) else {
            return false;
        };
        let Ok(presented) = hex::decode(mac_hex) else {
            return false;
        };
        let Ok(expected) = self.mac(secret, &salt) else {
            return false;
        };
        expected.ct_eq(&presented).into()
    }

    /// Gate a request: safe methods pass untouched, unsafe methods need a
    /// header token that verifies against the requester's session secret.
    pub async fn check_request(
        &self,
        method: &str,
        session_id: &str,
        header_token: Option<&str>,
    ) -> Result<()> {
        if SAFE_METHODS
            .iter()
            .any(|safe| method.eq_ignore_ascii_case(safe))
        {
            return Ok(());
        }

        let token = header_token.ok_or(Error::Csrf(CsrfReason::MissingToken))?;
        let secret = self
            .sessions
            .get_secret(session_id)
            .await?
            .ok_or(Error::Csrf(CsrfReason::InvalidToken))?;

        if !self.verify_token(&secret, token) {
            return Err(Error::Csrf(CsrfReason::InvalidToken));
        }
        Ok(())
    }

    fn mac(&self, secret: &str, salt: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| Error::Other(format!("mac key error: {}", e)))?;
        mac.update(salt);
        mac.update(self.server_secret.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySessionStore;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn service() -> CsrfService {
        let config = SecurityConfig::from_values(KEY, "jwt", "refresh", "session").unwrap();
        CsrfService::new(Arc::new(InMemorySessionStore::new()), &config)
    }

    #[test]
    fn test_token_verifies_repeatedly() {
        let svc = service();
        let token = svc.create_token("secret-a").unwrap();
        // Not single-use: the same token keeps verifying until the secret
        // changes
        assert!(svc.verify_token("secret-a", &token));
        assert!(svc.verify_token("secret-a", &token));
    }

    #[test]
    fn test_token_bound_to_its_secret() {
        let svc = service();
        let token = svc.create_token("secret-a").unwrap();
        assert!(!svc.verify_token("secret-b", &token));
    }

    #[test]
    fn test_distinct_tokens_same_secret_all_verify() {
        let svc = service();
        let a = svc.create_token("secret").unwrap();
        let b = svc.create_token("secret").unwrap();
        assert_ne!(a, b);
        assert!(svc.verify_token("secret", &a));
        assert!(svc.verify_token("secret", &b));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let svc = service();
        assert!(!svc.verify_token("secret", ""));
        assert!(!svc.verify_token("secret", "no-separator"));
        assert!(!svc.verify_token("secret", "zzzz.zzzz"));
    }

    #[tokio::test]
    async fn test_safe_methods_bypass() {
        let svc = service();
        for method in ["GET", "get", "HEAD", "OPTIONS"] {
            assert!(svc.check_request(method, "sess", None).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_missing_token_is_distinguished_from_invalid() {
        let svc = service();

        let err = svc.check_request("POST", "sess", None).await.unwrap_err();
        assert!(matches!(err, Error::Csrf(CsrfReason::MissingToken)));

        let err = svc
            .check_request("POST", "sess", Some("bogus.token"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Csrf(CsrfReason::InvalidToken)));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_issued_token_passes_check() {
        let svc = service();
        let token = svc.issue_token("sess-1").await.unwrap();

        assert!(svc
            .check_request("POST", "sess-1", Some(&token))
            .await
            .is_ok());
        // A different session's secret rejects it
        svc.issue_token("sess-2").await.unwrap();
        let err = svc
            .check_request("DELETE", "sess-2", Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Csrf(CsrfReason::InvalidToken)));
    }

    #[tokio::test]
    async fn test_invalidated_session_stops_verifying() {
        let svc = service();
        let token = svc.issue_token("sess-1").await.unwrap();
        svc.sessions.invalidate("sess-1").await.unwrap();

        let err = svc
            .check_request("POST", "sess-1", Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Csrf(CsrfReason::InvalidToken)));
    }
}
