//! Audit database migrations - embedded SQL files
//!
//! The audit log lives in its own database file with its own migration
//! history, tracked in the same sys_migrations scheme as the entity store.

/// All audit migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const AUDIT_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_initial_schema.sql",
        include_str!("001_initial_schema.sql"),
    ),
];
