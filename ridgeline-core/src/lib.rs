//! Ridgeline Core - security core for personal finance data
//!
//! This crate implements the field-level encryption and credential
//! lifecycle layer following hexagonal architecture:
//!
//! - **domain**: Core entities (User, Transaction, AuditEvent, etc.)
//! - **ports**: Trait definitions for external dependencies (Repository,
//!   AuditStore, SessionStore)
//! - **services**: Security logic (FieldCipher, CredentialService,
//!   CsrfService, AuditService, RateLimitService)
//! - **adapters**: Concrete implementations (DuckDB stores, in-memory
//!   session store)
//!
//! The surrounding CRUD/REST layer holds a [`SecurityContext`] and calls
//! through it; entity persistence flows through the repository, which
//! encrypts designated fields on save and decrypts them on load.

pub mod adapters;
pub mod audit_migrations;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::{DuckDbAuditStore, DuckDbRepository, InMemorySessionStore};
use config::SecurityConfig;
use domain::result::Result;
use ports::{AuditStore, Repository, SessionStore};
use services::*;

// Re-export commonly used types at crate root
pub use config::SecurityConfig as Config;
pub use domain::result::{CsrfReason, Error};
pub use domain::{
    AuditAction, AuditDraft, AuditEvent, AuditQuery, AuthProvider, Budget, ClientInfo, Goal,
    SecuritySummary, Severity, Transaction, User,
};
pub use services::{RouteClass, TokenPair};

/// Main context for the security core
///
/// This is the primary entry point. It wires the repositories, the field
/// cipher and all services, and is what the surrounding application holds.
pub struct SecurityContext {
    pub config: SecurityConfig,
    pub repository: Arc<dyn Repository>,
    pub audit_store: Arc<dyn AuditStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub cipher: FieldCipher,
    pub credential_service: CredentialService,
    pub csrf_service: CsrfService,
    pub audit_service: Arc<AuditService>,
    pub rate_limit_service: RateLimitService,
}

impl SecurityContext {
    /// Create a new security context over a data directory.
    ///
    /// Opens (or creates) the entity and audit databases in `data_dir`,
    /// runs pending migrations, and starts the audit writer. Must be called
    /// from within a tokio runtime.
    pub async fn new(data_dir: &Path, config: SecurityConfig) -> Result<Self> {
        let cipher = FieldCipher::new(&config);

        let repository: Arc<dyn Repository> = Arc::new(DuckDbRepository::new(
            &data_dir.join("ridgeline.duckdb"),
            cipher.clone(),
        )?);
        repository.ensure_schema().await?;

        let audit_store: Arc<dyn AuditStore> = Arc::new(DuckDbAuditStore::new(
            &data_dir.join("audit.duckdb"),
            cipher.clone(),
        )?);
        audit_store.ensure_schema().await?;

        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

        let audit_service = Arc::new(AuditService::spawn(Arc::clone(&audit_store)));
        let credential_service = CredentialService::new(
            Arc::clone(&repository),
            Arc::clone(&audit_service),
            config.clone(),
        )?;
        let csrf_service = CsrfService::new(Arc::clone(&session_store), &config);
        let rate_limit_service = RateLimitService::new();

        Ok(Self {
            config,
            repository,
            audit_store,
            session_store,
            cipher,
            credential_service,
            csrf_service,
            audit_service,
            rate_limit_service,
        })
    }
}
