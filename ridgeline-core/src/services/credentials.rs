//! Credential service - password and token lifecycle
//!
//! Owns password hashing and verification, access/refresh token issuance,
//! rotation-on-use, revocation, and the password-reset flow. Every
//! authentication outcome is recorded as an audit event from here, where the
//! outcome is known precisely.

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::domain::result::{Error, Result};
use crate::domain::{AuditAction, AuditDraft, AuthProvider, ClientInfo, User};
use crate::ports::Repository;
use crate::services::audit::AuditService;

/// Minimum accepted password length
const MIN_PASSWORD_LEN: usize = 8;

/// Generic failure message for both unknown-email and wrong-password, so
/// responses cannot be used to enumerate accounts
const INVALID_CREDENTIALS: &str = "invalid email or password";

/// A freshly issued access + refresh token pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    token_type: String,
    /// Random per-token id; two refresh tokens minted in the same second
    /// must still differ
    jti: String,
    iat: i64,
    exp: i64,
}

/// Service for the credential lifecycle
pub struct CredentialService {
    repo: Arc<dyn Repository>,
    audit: Arc<AuditService>,
    config: SecurityConfig,
    /// Verified against when an email lookup misses, so the miss takes as
    /// long as a real password check
    dummy_hash: String,
}

impl CredentialService {
    pub fn new(
        repo: Arc<dyn Repository>,
        audit: Arc<AuditService>,
        config: SecurityConfig,
    ) -> Result<Self> {
        let dummy_hash = hash_password_internal("ridgeline-timing-pad")?;
        Ok(Self {
            repo,
            audit,
            config,
            dummy_hash,
        })
    }

    // === Password hashing ===

    /// Hash a password with Argon2id. The plaintext is neither stored nor
    /// logged anywhere.
    pub fn hash_password(&self, plain: &str) -> Result<String> {
        hash_password_internal(plain)
    }

    /// Verify a password against a stored PHC hash (constant-time inside
    /// the library)
    pub fn verify_password(&self, plain: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    // === Registration and login ===

    /// Register a new local account
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<User> {
        crate::domain::validate_text(name, "name")?;
        validate_email(email)?;
        validate_password(password)?;

        if self.repo.find_by_email(email).await.is_ok() {
            return Err(Error::validation("an account with this email already exists"));
        }

        let mut user = User::new(name, email, AuthProvider::Local);
        user.password_hash = Some(self.hash_password(password)?);
        self.repo.add_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::Register, "auth")
                .actor(user.id.to_string())
                .client(client),
        );
        Ok(user)
    }

    /// Authenticate and issue a token pair.
    ///
    /// The failure message and timing are identical whether the email was
    /// unknown or the password wrong.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> Result<(User, TokenPair)> {
        let mut user = match self.repo.find_by_email(email).await {
            Ok(user) => user,
            Err(_) => {
                // Burn the same hashing work as a real check
                let _ = self.verify_password(password, &self.dummy_hash);
                self.audit.log(
                    AuditDraft::new(AuditAction::LoginFailed, "auth")
                        .details("unknown email")
                        .client(client)
                        .failed(),
                );
                return Err(Error::auth(INVALID_CREDENTIALS));
            }
        };

        let stored = user.password_hash.clone().unwrap_or_default();
        if !self.verify_password(password, &stored) {
            self.audit.log(
                AuditDraft::new(AuditAction::LoginFailed, "auth")
                    .actor(user.id.to_string())
                    .details("wrong password")
                    .client(client)
                    .failed(),
            );
            return Err(Error::auth(INVALID_CREDENTIALS));
        }

        let tokens = self.issue_tokens(user.id)?;
        user.push_refresh_token(tokens.refresh_token.clone(), self.config.refresh_token_ttl);
        self.repo.update_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::Login, "auth")
                .actor(user.id.to_string())
                .client(client),
        );
        Ok((user, tokens))
    }

    /// Revoke one refresh token. The record is marked, not deleted, so the
    /// audit trail of issued tokens survives.
    pub async fn revoke_refresh_token(&self, user_id: Uuid, token: &str) -> Result<()> {
        let mut user = self.require_user(user_id).await?;
        user.revoke_refresh_token(token);
        self.repo.update_user(&user).await
    }

    /// End a session: revoke the presented refresh token
    pub async fn logout(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        client: ClientInfo,
    ) -> Result<()> {
        self.revoke_refresh_token(user_id, refresh_token).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::Logout, "auth")
                .actor(user_id.to_string())
                .client(client),
        );
        Ok(())
    }

    // === Token issuance and rotation ===

    /// Mint a short-lived access token and a longer-lived refresh token
    pub fn issue_tokens(&self, user_id: Uuid) -> Result<TokenPair> {
        let now = Utc::now();

        let access = AccessClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.access_token_ttl).timestamp(),
        };
        let access_token = encode(
            &Header::default(),
            &access,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Other(format!("failed to sign access token: {}", e)))?;

        let refresh = RefreshClaims {
            sub: user_id.to_string(),
            token_type: "refresh".to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.refresh_token_ttl).timestamp(),
        };
        let refresh_token = encode(
            &Header::default(),
            &refresh,
            &EncodingKey::from_secret(self.config.jwt_refresh_secret.as_bytes()),
        )
        .map_err(|e| Error::Other(format!("failed to sign refresh token: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify a bearer access token and return the user id it carries
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::auth("invalid or expired access token"))?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| Error::auth("invalid or expired access token"))
    }

    /// Decode and check a refresh token's signature, expiry and type marker
    fn decode_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let data = decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_refresh_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::auth("invalid or expired refresh token"))?;

        if data.claims.token_type != "refresh" {
            return Err(Error::auth("invalid or expired refresh token"));
        }
        Ok(data.claims)
    }

    /// True iff the token decodes and a matching usable record exists
    pub async fn validate_refresh_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        if self.decode_refresh(token).is_err() {
            return Ok(false);
        }
        let user = self.require_user(user_id).await?;
        Ok(user.has_usable_refresh_token(token))
    }

    /// Rotation-on-use: validate the presented token, revoke it, issue and
    /// store a fresh pair. A rotated-out token replayed later fails here and
    /// raises a CRITICAL reuse event - the replay window of a stolen token
    /// closes at its first legitimate use.
    pub async fn rotate_on_refresh(
        &self,
        old_token: &str,
        client: ClientInfo,
    ) -> Result<(Uuid, TokenPair)> {
        let claims = match self.decode_refresh(old_token) {
            Ok(claims) => claims,
            Err(e) => {
                self.audit.log(
                    AuditDraft::new(AuditAction::TokenRefresh, "auth")
                        .details("undecodable refresh token")
                        .client(client)
                        .failed(),
                );
                return Err(e);
            }
        };

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| Error::auth("invalid or expired refresh token"))?;
        let mut user = self.require_user(user_id).await?;

        if !user.has_usable_refresh_token(old_token) {
            let action = if user.has_revoked_refresh_token(old_token) {
                // Replay of a rotated-out or revoked token
                AuditAction::RefreshTokenReuse
            } else {
                AuditAction::TokenRefresh
            };
            self.audit.log(
                AuditDraft::new(action, "auth")
                    .actor(user_id.to_string())
                    .client(client)
                    .failed(),
            );
            return Err(Error::auth("invalid or expired refresh token"));
        }

        user.revoke_refresh_token(old_token);
        let tokens = self.issue_tokens(user_id)?;
        user.push_refresh_token(tokens.refresh_token.clone(), self.config.refresh_token_ttl);
        self.repo.update_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::TokenRefresh, "auth")
                .actor(user_id.to_string())
                .client(client),
        );
        Ok((user_id, tokens))
    }

    /// Revoke every refresh token the user holds
    pub async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<()> {
        let mut user = self.require_user(user_id).await?;
        user.revoke_all_refresh_tokens();
        self.repo.update_user(&user).await
    }

    // === Password change ===

    /// Change the password after re-verifying the current one.
    ///
    /// On success every refresh token is revoked - other sessions must
    /// re-authenticate - except `keep_token`, which is re-added when it was
    /// usable before the change (the session that initiated the request
    /// stays signed in).
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current: &str,
        new: &str,
        keep_token: Option<&str>,
        client: ClientInfo,
    ) -> Result<()> {
        let mut user = self.require_user(user_id).await?;

        let stored = user.password_hash.clone().unwrap_or_default();
        if !self.verify_password(current, &stored) {
            self.audit.log(
                AuditDraft::new(AuditAction::PasswordChange, "auth")
                    .actor(user_id.to_string())
                    .details("incorrect current password")
                    .client(client)
                    .failed(),
            );
            return Err(Error::auth("incorrect current password"));
        }
        if new == current {
            return Err(Error::auth("new password must differ"));
        }
        validate_password(new)?;

        // Capture the initiating token's remaining lifetime before the sweep
        let keep = keep_token.and_then(|token| {
            user.refresh_tokens
                .iter()
                .find(|r| r.token == token && r.is_usable(Utc::now()))
                .map(|r| (token.to_string(), r.expires_at))
        });

        user.password_hash = Some(self.hash_password(new)?);
        user.revoke_all_refresh_tokens();
        if let Some((token, expires_at)) = keep {
            let remaining = expires_at - Utc::now();
            if remaining > Duration::zero() {
                user.push_refresh_token(token, remaining);
            }
        }
        self.repo.update_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::PasswordChange, "auth")
                .actor(user_id.to_string())
                .client(client),
        );
        Ok(())
    }

    // === Password reset ===

    /// Begin a password reset.
    ///
    /// Returns the raw token to hand to the mailer when the account exists,
    /// `None` otherwise; callers must present the same outward response in
    /// both cases. Only the token's digest is stored, with a 10-minute
    /// expiry.
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: ClientInfo,
    ) -> Result<Option<String>> {
        let mut user = match self.repo.find_by_email(email).await {
            Ok(user) => user,
            Err(_) => {
                self.audit.log(
                    AuditDraft::new(AuditAction::PasswordResetRequest, "auth")
                        .details("unknown email")
                        .client(client)
                        .failed(),
                );
                return Ok(None);
            }
        };

        let (token, digest) = generate_reset_token();
        user.set_reset_token(digest, Utc::now() + self.config.reset_token_ttl);
        self.repo.update_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::PasswordResetRequest, "auth")
                .actor(user.id.to_string())
                .client(client),
        );
        Ok(Some(token))
    }

    /// Complete a password reset with the raw token from the reset email.
    /// Success clears the reset state and revokes all refresh tokens.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        client: ClientInfo,
    ) -> Result<()> {
        let digest = sha256_hex(token);

        let mut user = match self.repo.find_by_reset_hash(&digest).await? {
            Some(user) => user,
            None => {
                self.audit.log(
                    AuditDraft::new(AuditAction::PasswordReset, "auth")
                        .details("no matching reset token")
                        .client(client)
                        .failed(),
                );
                return Err(Error::auth("invalid or expired token"));
            }
        };

        let stored = user.reset_token_hash.clone().unwrap_or_default();
        let digest_matches: bool = stored.as_bytes().ct_eq(digest.as_bytes()).into();
        let unexpired = user
            .reset_token_expires_at
            .map(|t| Utc::now() < t)
            .unwrap_or(false);
        if !digest_matches || !unexpired {
            self.audit.log(
                AuditDraft::new(AuditAction::PasswordReset, "auth")
                    .actor(user.id.to_string())
                    .details("expired or mismatched reset token")
                    .client(client)
                    .failed(),
            );
            return Err(Error::auth("invalid or expired token"));
        }

        validate_password(new_password)?;

        user.password_hash = Some(self.hash_password(new_password)?);
        user.clear_reset_token();
        user.revoke_all_refresh_tokens();
        self.repo.update_user(&user).await?;

        self.audit.log(
            AuditDraft::new(AuditAction::PasswordReset, "auth")
                .actor(user.id.to_string())
                .client(client),
        );
        Ok(())
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User> {
        self.repo
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {}", user_id)))
    }
}

fn hash_password_internal(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| Error::Other(format!("password hashing failed: {}", e)))?
        .to_string())
}

/// High-entropy reset token and its storable digest
fn generate_reset_token() -> (String, String) {
    let bytes: [u8; 32] = rand::random();
    let token = hex::encode(bytes);
    let digest = sha256_hex(&token);
    (token, digest)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn validate_email(email: &str) -> Result<()> {
    let trimmed = email.trim();
    if trimmed.len() < 3 || trimmed.len() > 254 || !trimmed.contains('@') {
        return Err(Error::validation("invalid email address"));
    }
    if trimmed.contains(char::is_whitespace) {
        return Err(Error::validation("invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password_internal("Secret123!").unwrap();
        assert!(hash.starts_with("$argon2"));

        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"Secret123!", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong", &parsed)
            .is_err());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password_internal("Secret123!").unwrap();
        let b = hash_password_internal("Secret123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reset_token_digest_is_deterministic() {
        let (token, digest) = generate_reset_token();
        assert_eq!(token.len(), 64);
        assert_eq!(digest, sha256_hex(&token));

        let (other, _) = generate_reset_token();
        assert_ne!(token, other);
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("has space@example.com").is_err());
        assert!(validate_email("a@").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("Secret123!").is_ok());
        assert!(validate_password("short").is_err());
    }
}
