//! DuckDB audit store implementation
//!
//! Audit events live in their own database file (audit.duckdb) so retention
//! and access control can differ from entity data. The free-text details
//! column is encrypted here, at the same codec boundary the entity
//! repository uses.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use duckdb::{params, Connection};

use crate::audit_migrations::AUDIT_MIGRATIONS;
use crate::domain::result::{Error, Result};
use crate::domain::{AuditAction, AuditEvent, AuditQuery, SecuritySummary, Severity};
use crate::ports::AuditStore;
use crate::services::cipher::FieldCipher;
use crate::services::migration::MigrationService;

fn db_err(e: duckdb::Error) -> Error {
    Error::database(e.to_string())
}

const EVENT_COLUMNS: &str = "event_id, event_time, actor, action, resource, resource_id, \
     details_enc, ip_address, user_agent, session_id, success, severity";

/// DuckDB-backed append-only audit store
pub struct DuckDbAuditStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    cipher: FieldCipher,
}

impl DuckDbAuditStore {
    /// Open (or create) the audit database
    pub fn new(db_path: &Path, cipher: FieldCipher) -> Result<Self> {
        let config = duckdb::Config::default()
            .enable_autoload_extension(false)
            .map_err(db_err)?;
        let conn = Connection::open_with_flags(db_path, config).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
            cipher,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("connection lock poisoned: {}", e)))
    }

    fn decode_event(&self, row: &duckdb::Row) -> Result<AuditEvent> {
        // Columns as in EVENT_COLUMNS
        let action_str: String = row.get(3).map_err(db_err)?;
        let details_enc: Option<String> = row.get(6).ok();

        Ok(AuditEvent {
            id: row.get(0).map_err(db_err)?,
            timestamp: row.get(1).map_err(db_err)?,
            actor: row.get(2).map_err(db_err)?,
            action: AuditAction::parse(&action_str)
                .ok_or_else(|| Error::database(format!("unknown audit action: {}", action_str)))?,
            resource: row.get(4).map_err(db_err)?,
            resource_id: row.get(5).ok(),
            details: match details_enc {
                Some(enc) => Some(self.cipher.decrypt(&enc)?),
                None => None,
            },
            ip_address: row.get(7).ok(),
            user_agent: row.get(8).ok(),
            session_id: row.get(9).ok(),
            success: row.get(10).map_err(db_err)?,
            severity: Severity::parse(&row.get::<_, String>(11).unwrap_or_default()),
        })
    }
}

#[async_trait]
impl AuditStore for DuckDbAuditStore {
    async fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        MigrationService::new(&conn, AUDIT_MIGRATIONS).run_pending()?;
        Ok(())
    }

    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let details_enc = match &event.details {
            Some(details) => Some(self.cipher.encrypt(details)?),
            None => None,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_audit_events (event_id, event_time, actor, action, resource, \
             resource_id, details_enc, ip_address, user_agent, session_id, success, severity) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.id,
                event.timestamp,
                event.actor,
                event.action.as_str(),
                event.resource,
                event.resource_id,
                details_enc,
                event.ip_address,
                event.user_agent,
                event.session_id,
                event.success,
                event.severity.as_str(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn events_for_user(
        &self,
        actor: &str,
        query: &AuditQuery,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let mut sql = format!(
            "SELECT {} FROM sys_audit_events WHERE actor = ?",
            EVENT_COLUMNS
        );
        let mut args: Vec<String> = vec![actor.to_string()];

        if let Some(action) = query.action {
            sql.push_str(" AND action = ?");
            args.push(action.as_str().to_string());
        }
        // Numeric bounds are inlined; they come from i64/usize, not user text
        if let Some(from) = query.from {
            sql.push_str(&format!(" AND event_time >= {}", from));
        }
        if let Some(to) = query.to {
            sql.push_str(&format!(" AND event_time < {}", to));
        }
        sql.push_str(&format!(
            " ORDER BY event_time DESC, event_id DESC LIMIT {}",
            limit
        ));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(duckdb::params_from_iter(args.iter()), |row| {
                Ok(self.decode_event(row))
            })
            .map_err(db_err)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(db_err)??);
        }
        Ok(events)
    }

    async fn security_summary(&self, actor: &str, window_days: u32) -> Result<SecuritySummary> {
        let cutoff = chrono::Utc::now().timestamp_millis() - i64::from(window_days) * 86_400_000;

        let conn = self.lock()?;
        let (total_events, failed_logins, high_or_critical, last_login) = conn
            .query_row(
                "SELECT COUNT(*), \
                 COUNT(*) FILTER (WHERE action = 'login_failed'), \
                 COUNT(*) FILTER (WHERE severity IN ('HIGH', 'CRITICAL')), \
                 MAX(event_time) FILTER (WHERE action = 'login' AND success) \
                 FROM sys_audit_events WHERE actor = ? AND event_time >= ?",
                params![actor, cutoff],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .map_err(db_err)?;

        Ok(SecuritySummary {
            window_days,
            total_events: total_events as u64,
            failed_logins: failed_logins as u64,
            high_or_critical: high_or_critical as u64,
            last_login,
        })
    }
}
