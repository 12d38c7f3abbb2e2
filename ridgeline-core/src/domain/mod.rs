//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod audit;
mod budget;
mod goal;
mod transaction;
mod user;
pub mod result;

pub use audit::{
    AuditAction, AuditDraft, AuditEvent, AuditQuery, ClientInfo, SecuritySummary, Severity,
};
pub use budget::Budget;
pub use goal::Goal;
pub use transaction::{validate_amount, validate_text, Transaction, MAX_AMOUNT, MAX_DESCRIPTION_LEN};
pub use user::{AuthProvider, RefreshTokenRecord, User, MAX_ACTIVE_REFRESH_TOKENS};
