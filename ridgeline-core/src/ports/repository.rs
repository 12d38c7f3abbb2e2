//! Repository port - database abstraction
//!
//! Adapters own the field codec: callers pass and receive plaintext domain
//! entities, and every designated field is encrypted on save and decrypted
//! on load inside the adapter.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{
    AuditEvent, AuditQuery, Budget, Goal, SecuritySummary, Transaction, User,
};

/// Database repository abstraction
///
/// This trait defines all entity operations. Implementations (adapters)
/// provide the actual database access logic and the encryption boundary.
#[async_trait]
pub trait Repository: Send + Sync {
    // === Schema ===

    /// Run any pending migrations
    async fn ensure_schema(&self) -> Result<()>;

    // === Users ===

    /// Add a new user
    async fn add_user(&self, user: &User) -> Result<()>;

    /// Update an existing user (including its refresh-token list)
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Get user by ID
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Resolve a user by email address.
    ///
    /// Email ciphertext is non-deterministic, so implementations must load
    /// candidates and decrypt-and-compare (case-insensitive) until a match
    /// is found. Returns `NotFound` when no user matches.
    async fn find_by_email(&self, email: &str) -> Result<User>;

    /// Resolve a user by the digest of an outstanding password-reset token
    async fn find_by_reset_hash(&self, token_hash: &str) -> Result<Option<User>>;

    // === Transactions ===

    /// Add a new transaction
    async fn add_transaction(&self, tx: &Transaction) -> Result<()>;

    /// Get transactions for a user, newest first
    async fn get_transactions_by_user(&self, user_id: Uuid) -> Result<Vec<Transaction>>;

    // === Budgets ===

    /// Add a new budget
    async fn add_budget(&self, budget: &Budget) -> Result<()>;

    /// Update an existing budget
    async fn update_budget(&self, budget: &Budget) -> Result<()>;

    /// Get budgets for a user
    async fn get_budgets_by_user(&self, user_id: Uuid) -> Result<Vec<Budget>>;

    // === Goals ===

    /// Add a new goal
    async fn add_goal(&self, goal: &Goal) -> Result<()>;

    /// Update an existing goal
    async fn update_goal(&self, goal: &Goal) -> Result<()>;

    /// Get goals for a user
    async fn get_goals_by_user(&self, user_id: Uuid) -> Result<Vec<Goal>>;
}

/// Append-only audit event persistence
///
/// Separate from [`Repository`]: audit events live in their own database so
/// retention and access control can differ from entity data.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Run any pending migrations
    async fn ensure_schema(&self) -> Result<()>;

    /// Append one event. Events are never mutated or deleted here.
    async fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Events for a user, most recent first, optionally filtered
    async fn events_for_user(
        &self,
        actor: &str,
        query: &AuditQuery,
        limit: usize,
    ) -> Result<Vec<AuditEvent>>;

    /// Security summary for a user over a trailing window
    async fn security_summary(&self, actor: &str, window_days: u32) -> Result<SecuritySummary>;
}
