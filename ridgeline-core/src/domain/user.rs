//! User domain model
//!
//! The user owns its refresh-token records; the bounded-list and
//! revocation invariants live here so every storage adapter inherits them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of active (non-revoked, non-expired) refresh tokens per user.
/// The oldest active record is evicted when a new one would exceed this.
pub const MAX_ACTIVE_REFRESH_TOKENS: usize = 5;

/// How the user authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "google" => AuthProvider::Google,
            _ => AuthProvider::Local,
        }
    }
}

/// A refresh token owned by a user.
///
/// State machine: issued -> active -> {rotated-out | revoked | expired}.
/// Terminal states are absorbing; a record is never un-revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshTokenRecord {
    pub fn new(token: impl Into<String>, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            created_at: now,
            expires_at: now + ttl,
            revoked: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A token is usable iff `now < expiry AND !revoked`
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired(now)
    }
}

/// Identity record
///
/// `name` and `email` are plaintext in memory; the repository adapter
/// encrypts both at rest. `password_hash` is a PHC string and is never
/// serialized outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    #[serde(skip_serializing)]
    pub refresh_tokens: Vec<RefreshTokenRecord>,
    #[serde(skip_serializing)]
    pub reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, provider: AuthProvider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: None,
            provider,
            refresh_tokens: Vec::new(),
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Count of records that are still usable
    pub fn active_refresh_token_count(&self, now: DateTime<Utc>) -> usize {
        self.refresh_tokens
            .iter()
            .filter(|r| r.is_usable(now))
            .count()
    }

    /// Append a refresh token, maintaining the bounded-list invariant.
    ///
    /// Expired and revoked records are pruned first (they are only kept
    /// until the list is next touched), then the oldest active record is
    /// evicted if the set would exceed [`MAX_ACTIVE_REFRESH_TOKENS`].
    pub fn push_refresh_token(&mut self, token: impl Into<String>, ttl: Duration) {
        let now = Utc::now();
        self.refresh_tokens.retain(|r| r.is_usable(now));

        while self.refresh_tokens.len() >= MAX_ACTIVE_REFRESH_TOKENS {
            let oldest = self
                .refresh_tokens
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.created_at)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    self.refresh_tokens.remove(i);
                }
                None => break,
            }
        }

        self.refresh_tokens
            .push(RefreshTokenRecord::new(token, ttl, now));
        self.updated_at = now;
    }

    /// True iff a matching, non-revoked, non-expired record exists
    pub fn has_usable_refresh_token(&self, token: &str) -> bool {
        let now = Utc::now();
        self.refresh_tokens
            .iter()
            .any(|r| r.token == token && r.is_usable(now))
    }

    /// True iff a matching record exists that was revoked (rotation replay)
    pub fn has_revoked_refresh_token(&self, token: &str) -> bool {
        self.refresh_tokens
            .iter()
            .any(|r| r.token == token && r.revoked)
    }

    /// Mark the matching record revoked. The record is kept, not deleted.
    pub fn revoke_refresh_token(&mut self, token: &str) {
        for record in &mut self.refresh_tokens {
            if record.token == token {
                record.revoked = true;
            }
        }
        self.updated_at = Utc::now();
    }

    /// Mark every record revoked
    pub fn revoke_all_refresh_tokens(&mut self) {
        for record in &mut self.refresh_tokens {
            record.revoked = true;
        }
        self.updated_at = Utc::now();
    }

    /// Set password-reset state (digest of the raw token plus expiry)
    pub fn set_reset_token(&mut self, token_hash: String, expires_at: DateTime<Utc>) {
        self.reset_token_hash = Some(token_hash);
        self.reset_token_expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    /// Clear password-reset state after a successful or superseded reset
    pub fn clear_reset_token(&mut self) {
        self.reset_token_hash = None;
        self.reset_token_expires_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("Alice", "alice@example.com", AuthProvider::Local)
    }

    #[test]
    fn test_token_usable_iff_unexpired_and_unrevoked() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord::new("tok", Duration::days(7), now);
        assert!(record.is_usable(now));

        record.revoked = true;
        assert!(!record.is_usable(now));

        let expired = RefreshTokenRecord::new("tok2", Duration::seconds(-1), now);
        assert!(!expired.is_usable(now));
    }

    #[test]
    fn test_token_cap_evicts_oldest() {
        let mut u = user();
        for i in 0..MAX_ACTIVE_REFRESH_TOKENS {
            u.push_refresh_token(format!("tok-{}", i), Duration::days(7));
            // Distinct created_at ordering
            u.refresh_tokens.last_mut().unwrap().created_at =
                Utc::now() + Duration::seconds(i as i64);
        }
        assert_eq!(u.refresh_tokens.len(), MAX_ACTIVE_REFRESH_TOKENS);

        u.push_refresh_token("tok-5", Duration::days(7));
        assert_eq!(u.refresh_tokens.len(), MAX_ACTIVE_REFRESH_TOKENS);
        assert!(!u.refresh_tokens.iter().any(|r| r.token == "tok-0"));
        assert!(u.has_usable_refresh_token("tok-5"));
        assert!(u.has_usable_refresh_token("tok-1"));
    }

    #[test]
    fn test_push_prunes_revoked_and_expired() {
        let mut u = user();
        u.push_refresh_token("dead", Duration::days(7));
        u.revoke_refresh_token("dead");
        u.push_refresh_token("expired", Duration::seconds(-10));
        u.push_refresh_token("live", Duration::days(7));

        assert!(u.refresh_tokens.iter().all(|r| r.token != "dead"));
        assert!(u.refresh_tokens.iter().all(|r| r.token != "expired"));
        assert!(u.has_usable_refresh_token("live"));
    }

    #[test]
    fn test_revoke_marks_but_keeps_record() {
        let mut u = user();
        u.push_refresh_token("tok", Duration::days(7));
        u.revoke_refresh_token("tok");

        assert!(!u.has_usable_refresh_token("tok"));
        assert!(u.has_revoked_refresh_token("tok"));
        assert_eq!(u.refresh_tokens.len(), 1);
    }

    #[test]
    fn test_revoke_all() {
        let mut u = user();
        u.push_refresh_token("a", Duration::days(7));
        u.push_refresh_token("b", Duration::days(7));
        u.revoke_all_refresh_tokens();

        assert_eq!(u.active_refresh_token_count(Utc::now()), 0);
        assert_eq!(u.refresh_tokens.len(), 2);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let mut u = user();
        u.password_hash = Some("$argon2id$secret".to_string());
        let json = serde_json::to_string(&u).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_provider_round_trip() {
        assert_eq!(AuthProvider::parse("google"), AuthProvider::Google);
        assert_eq!(AuthProvider::parse("local"), AuthProvider::Local);
        assert_eq!(AuthProvider::parse("unknown"), AuthProvider::Local);
        assert_eq!(AuthProvider::Google.as_str(), "google");
    }
}
