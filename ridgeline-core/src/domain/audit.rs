//! Audit domain model
//!
//! Audit events are append-only. Severity is derived statically from the
//! action kind so triage ordering cannot drift per call site.

use serde::{Deserialize, Serialize};

/// Closed set of security-relevant event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Register,
    Login,
    LoginFailed,
    Logout,
    TokenRefresh,
    RefreshTokenReuse,
    PasswordChange,
    PasswordResetRequest,
    PasswordReset,
    AccountLockout,
    UnauthorizedAccess,
    CsrfRejected,
    RateLimitTrigger,
    SuspiciousActivity,
    RecordCreate,
    RecordUpdate,
    RecordDelete,
    DataExport,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Register => "register",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::TokenRefresh => "token_refresh",
            AuditAction::RefreshTokenReuse => "refresh_token_reuse",
            AuditAction::PasswordChange => "password_change",
            AuditAction::PasswordResetRequest => "password_reset_request",
            AuditAction::PasswordReset => "password_reset",
            AuditAction::AccountLockout => "account_lockout",
            AuditAction::UnauthorizedAccess => "unauthorized_access",
            AuditAction::CsrfRejected => "csrf_rejected",
            AuditAction::RateLimitTrigger => "rate_limit_trigger",
            AuditAction::SuspiciousActivity => "suspicious_activity",
            AuditAction::RecordCreate => "record_create",
            AuditAction::RecordUpdate => "record_update",
            AuditAction::RecordDelete => "record_delete",
            AuditAction::DataExport => "data_export",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "register" => AuditAction::Register,
            "login" => AuditAction::Login,
            "login_failed" => AuditAction::LoginFailed,
            "logout" => AuditAction::Logout,
            "token_refresh" => AuditAction::TokenRefresh,
            "refresh_token_reuse" => AuditAction::RefreshTokenReuse,
            "password_change" => AuditAction::PasswordChange,
            "password_reset_request" => AuditAction::PasswordResetRequest,
            "password_reset" => AuditAction::PasswordReset,
            "account_lockout" => AuditAction::AccountLockout,
            "unauthorized_access" => AuditAction::UnauthorizedAccess,
            "csrf_rejected" => AuditAction::CsrfRejected,
            "rate_limit_trigger" => AuditAction::RateLimitTrigger,
            "suspicious_activity" => AuditAction::SuspiciousActivity,
            "record_create" => AuditAction::RecordCreate,
            "record_update" => AuditAction::RecordUpdate,
            "record_delete" => AuditAction::RecordDelete,
            "data_export" => AuditAction::DataExport,
            _ => return None,
        })
    }

    /// Static severity classification
    pub fn severity(&self) -> Severity {
        match self {
            AuditAction::RefreshTokenReuse => Severity::Critical,

            AuditAction::LoginFailed
            | AuditAction::AccountLockout
            | AuditAction::UnauthorizedAccess
            | AuditAction::CsrfRejected
            | AuditAction::RateLimitTrigger
            | AuditAction::SuspiciousActivity => Severity::High,

            AuditAction::PasswordChange
            | AuditAction::PasswordResetRequest
            | AuditAction::PasswordReset
            | AuditAction::RecordUpdate
            | AuditAction::RecordDelete => Severity::Medium,

            AuditAction::Register
            | AuditAction::Login
            | AuditAction::Logout
            | AuditAction::TokenRefresh
            | AuditAction::RecordCreate
            | AuditAction::DataExport => Severity::Low,
        }
    }
}

/// Triage label for security review
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CRITICAL" => Severity::Critical,
            "HIGH" => Severity::High,
            "MEDIUM" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Request-scoped client context attached to audit events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    /// Number of hops in the forwarded-for chain, when behind proxies
    #[serde(default)]
    pub forwarded_chain_len: usize,
}

/// An audit event to be recorded (caller-facing builder)
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub actor: String,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub client: ClientInfo,
    pub success: bool,
}

impl AuditDraft {
    pub fn new(action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            actor: "anonymous".to_string(),
            action,
            resource: resource.into(),
            resource_id: None,
            details: None,
            client: ClientInfo::default(),
            success: true,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Free-text details; encrypted before the event is persisted
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// An audit event as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: u64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub actor: String,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub success: bool,
    pub severity: Severity,
}

/// Filter for the audit query surface
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub action: Option<AuditAction>,
    /// Inclusive lower bound, unix ms
    pub from: Option<i64>,
    /// Exclusive upper bound, unix ms
    pub to: Option<i64>,
}

/// Counts of recent security activity for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub window_days: u32,
    pub total_events: u64,
    pub failed_logins: u64,
    pub high_or_critical: u64,
    /// Unix ms of the most recent successful login, if any
    pub last_login: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AuditAction::LoginFailed.severity(), Severity::High);
        assert_eq!(AuditAction::AccountLockout.severity(), Severity::High);
        assert_eq!(AuditAction::UnauthorizedAccess.severity(), Severity::High);
        assert_eq!(AuditAction::RateLimitTrigger.severity(), Severity::High);
        assert_eq!(AuditAction::PasswordChange.severity(), Severity::Medium);
        assert_eq!(AuditAction::RecordDelete.severity(), Severity::Medium);
        assert_eq!(AuditAction::Login.severity(), Severity::Low);
        assert_eq!(AuditAction::RefreshTokenReuse.severity(), Severity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_action_round_trip() {
        for action in [
            AuditAction::Login,
            AuditAction::RefreshTokenReuse,
            AuditAction::SuspiciousActivity,
            AuditAction::RecordDelete,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("nonsense"), None);
    }

    #[test]
    fn test_draft_defaults_to_anonymous() {
        let draft = AuditDraft::new(AuditAction::LoginFailed, "auth").failed();
        assert_eq!(draft.actor, "anonymous");
        assert!(!draft.success);
    }
}
