//! Configuration management
//!
//! All secret material is loaded once at process start. A missing or
//! malformed secret is a fatal configuration error, never a per-request
//! failure.

use chrono::Duration;

use crate::domain::result::{Error, Result};

/// Environment variable carrying the 32-byte hex-encoded field encryption key
pub const ENV_ENCRYPTION_KEY: &str = "RIDGELINE_ENCRYPTION_KEY";
/// Environment variable carrying the access-token signing secret
pub const ENV_JWT_SECRET: &str = "RIDGELINE_JWT_SECRET";
/// Environment variable carrying the refresh-token signing secret
pub const ENV_JWT_REFRESH_SECRET: &str = "RIDGELINE_JWT_REFRESH_SECRET";
/// Environment variable carrying the CSRF session secret
pub const ENV_SESSION_SECRET: &str = "RIDGELINE_SESSION_SECRET";

/// Required length of the field encryption key in bytes
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Security configuration, resolved once at startup
#[derive(Clone)]
pub struct SecurityConfig {
    /// AES-256-GCM key for field-level encryption
    pub encryption_key: [u8; ENCRYPTION_KEY_LEN],
    /// HS256 secret for access tokens
    pub jwt_secret: String,
    /// HS256 secret for refresh tokens
    pub jwt_refresh_secret: String,
    /// Keying material for CSRF session secrets
    pub session_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub reset_token_ttl: Duration,
}

impl std::fmt::Debug for SecurityConfig {
    // Secrets stay out of debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("reset_token_ttl", &self.reset_token_ttl)
            .finish_non_exhaustive()
    }
}

impl SecurityConfig {
    /// Load the configuration from the environment.
    ///
    /// Fails with a configuration error if any secret is absent or the
    /// encryption key is not exactly 32 bytes of hex.
    pub fn from_env() -> Result<Self> {
        let key_hex = require_env(ENV_ENCRYPTION_KEY)?;
        let jwt_secret = require_env(ENV_JWT_SECRET)?;
        let jwt_refresh_secret = require_env(ENV_JWT_REFRESH_SECRET)?;
        let session_secret = require_env(ENV_SESSION_SECRET)?;

        Self::from_values(&key_hex, jwt_secret, jwt_refresh_secret, session_secret)
    }

    /// Build a configuration from explicit values (used by tests and by
    /// hosts that manage secrets themselves).
    pub fn from_values(
        encryption_key_hex: &str,
        jwt_secret: impl Into<String>,
        jwt_refresh_secret: impl Into<String>,
        session_secret: impl Into<String>,
    ) -> Result<Self> {
        let key_bytes = hex::decode(encryption_key_hex.trim())
            .map_err(|_| Error::config("encryption key is not valid hex"))?;
        if key_bytes.len() != ENCRYPTION_KEY_LEN {
            return Err(Error::config(format!(
                "encryption key must be exactly {} bytes, got {}",
                ENCRYPTION_KEY_LEN,
                key_bytes.len()
            )));
        }
        let mut encryption_key = [0u8; ENCRYPTION_KEY_LEN];
        encryption_key.copy_from_slice(&key_bytes);

        let jwt_secret = non_empty(jwt_secret.into(), ENV_JWT_SECRET)?;
        let jwt_refresh_secret = non_empty(jwt_refresh_secret.into(), ENV_JWT_REFRESH_SECRET)?;
        let session_secret = non_empty(session_secret.into(), ENV_SESSION_SECRET)?;

        Ok(Self {
            encryption_key,
            jwt_secret,
            jwt_refresh_secret,
            session_secret,
            access_token_ttl: Duration::hours(2),
            refresh_token_ttl: Duration::days(7),
            reset_token_ttl: Duration::minutes(10),
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::config(format!("{} is not set", name))),
    }
}

fn non_empty(value: String, name: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::config(format!("{} must not be empty", name)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_valid_config() {
        let config = SecurityConfig::from_values(KEY, "jwt", "refresh", "session").unwrap();
        assert_eq!(config.encryption_key[0], 0x00);
        assert_eq!(config.encryption_key[31], 0x1f);
        assert_eq!(config.access_token_ttl, Duration::hours(2));
        assert_eq!(config.refresh_token_ttl, Duration::days(7));
        assert_eq!(config.reset_token_ttl, Duration::minutes(10));
    }

    #[test]
    fn test_short_key_rejected() {
        let err = SecurityConfig::from_values("deadbeef", "a", "b", "c").unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_non_hex_key_rejected() {
        assert!(SecurityConfig::from_values("zz", "a", "b", "c").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SecurityConfig::from_values(KEY, "", "b", "c").is_err());
        assert!(SecurityConfig::from_values(KEY, "a", " ", "c").is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = SecurityConfig::from_values(KEY, "topsecret", "refresh", "session").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("topsecret"));
    }
}
