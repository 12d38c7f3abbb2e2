//! Audit service - structured security event recording
//!
//! Recording is fire-and-forget: events are handed to a bounded queue and
//! written by a background worker, so a storage failure can never abort the
//! business operation that triggered the event. Write failures go to the
//! tracing side channel instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};

use crate::domain::result::Result;
use crate::domain::{AuditDraft, AuditEvent, AuditQuery, SecuritySummary};
use crate::ports::AuditStore;

/// Bound on the in-flight event queue; events beyond it are dropped (and
/// the drop itself is traced)
const QUEUE_CAPACITY: usize = 1024;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    // Lower 48 bits of timestamp (good for ~8900 years),
    // upper 16 bits for a counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Get current unix timestamp in milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

enum AuditMsg {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Service for recording and querying security audit events
pub struct AuditService {
    tx: mpsc::Sender<AuditMsg>,
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    /// Start the background writer and return the service handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn AuditStore>) -> Self {
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        let writer = Arc::clone(&store);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    AuditMsg::Event(event) => {
                        if let Err(e) = writer.append(&event).await {
                            tracing::error!(error = %e, action = event.action.as_str(),
                                "audit write failed, event lost");
                        }
                    }
                    AuditMsg::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });

        Self { tx, store }
    }

    /// Record an event. Best-effort: this never fails and never blocks the
    /// caller; severity is derived from the action kind.
    pub fn log(&self, draft: AuditDraft) {
        let event = AuditEvent {
            id: generate_id(),
            timestamp: now_ms(),
            severity: draft.action.severity(),
            actor: draft.actor,
            action: draft.action,
            resource: draft.resource,
            resource_id: draft.resource_id,
            details: draft.details,
            ip_address: draft.client.ip_address,
            user_agent: draft.client.user_agent,
            session_id: draft.client.session_id,
            success: draft.success,
        };

        if let Err(e) = self.tx.try_send(AuditMsg::Event(event)) {
            tracing::warn!(error = %e, "audit queue unavailable, event dropped");
        }
    }

    /// Wait until every previously enqueued event has been written.
    /// The queue is FIFO, so the flush ack implies all earlier events
    /// were handed to the store.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(AuditMsg::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Events for a user, most recent first, optionally filtered by action
    /// and date range. Reads go straight to the store, not through the queue.
    pub async fn events_for_user(
        &self,
        actor: &str,
        query: &AuditQuery,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        self.store.events_for_user(actor, query, limit).await
    }

    /// Security summary for a user over a trailing window
    pub async fn security_summary(&self, actor: &str, window_days: u32) -> Result<SecuritySummary> {
        self.store.security_summary(actor, window_days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::Error;
    use crate::domain::AuditAction;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store that records appends in memory and can be told to fail
    #[derive(Default)]
    struct StubStore {
        events: Mutex<Vec<AuditEvent>>,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl AuditStore for StubStore {
        async fn ensure_schema(&self) -> Result<()> {
            Ok(())
        }

        async fn append(&self, event: &AuditEvent) -> Result<()> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(Error::database("disk on fire"));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn events_for_user(
            &self,
            actor: &str,
            _query: &AuditQuery,
            limit: usize,
        ) -> Result<Vec<AuditEvent>> {
            let mut events: Vec<AuditEvent> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.actor == actor)
                .cloned()
                .collect();
            events.reverse();
            events.truncate(limit);
            Ok(events)
        }

        async fn security_summary(&self, _actor: &str, window_days: u32) -> Result<SecuritySummary> {
            Ok(SecuritySummary {
                window_days,
                total_events: self.events.lock().unwrap().len() as u64,
                failed_logins: 0,
                high_or_critical: 0,
                last_login: None,
            })
        }
    }

    #[tokio::test]
    async fn test_events_are_written_with_derived_severity() {
        let store = Arc::new(StubStore::default());
        let service = AuditService::spawn(Arc::clone(&store) as Arc<dyn AuditStore>);

        service.log(
            AuditDraft::new(AuditAction::LoginFailed, "auth")
                .actor("user-1")
                .failed(),
        );
        service.flush().await;

        let events = store.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, crate::domain::Severity::High);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_surface() {
        let store = Arc::new(StubStore::default());
        store.fail.store(true, Ordering::Relaxed);
        let service = AuditService::spawn(Arc::clone(&store) as Arc<dyn AuditStore>);

        // Must not panic or return an error to the caller
        service.log(AuditDraft::new(AuditAction::Login, "auth").actor("user-1"));
        service.flush().await;

        assert!(store.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_are_unique_within_a_burst() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_id()));
        }
    }
}
