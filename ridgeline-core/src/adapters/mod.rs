//! Adapters - concrete implementations of the ports

pub mod duckdb;
pub mod duckdb_audit;
pub mod memory;

pub use self::duckdb::DuckDbRepository;
pub use duckdb_audit::DuckDbAuditStore;
pub use memory::InMemorySessionStore;
