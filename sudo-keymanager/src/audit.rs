//! Audit logging: every key operation emits a structured event.

use crate::types::{KeyId, KeyKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    KeyGenerated,
    KeyImported,
    KeyDeleted,
    KeyMadeCurrent,
    KeysExported { count: usize },
    KeysCleared,
    Encrypt,
    Decrypt,
    Wrap,
    Unwrap,
}

/// A structured audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub key_id: Option<KeyId>,
    pub key_kind: Option<KeyKind>,
    pub action: AuditAction,
    pub success: bool,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn key_event(key_id: &KeyId, key_kind: KeyKind, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: Some(key_id.clone()),
            key_kind: Some(key_kind),
            action,
            success: true,
            detail: None,
        }
    }

    /// An event not tied to a single key (export, clear).
    pub fn store_event(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: None,
            key_kind: None,
            action,
            success: true,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where audit events go.
///
/// Synchronous: the key manager itself is synchronous and sinks are
/// expected to be cheap (log line, vector push, channel send).
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via `tracing` under the `audit` target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.success {
            tracing::info!(
                target: "audit",
                key_id = ?event.key_id.as_ref().map(|k| k.as_str()),
                key_kind = ?event.key_kind,
                action = ?event.action,
                detail = ?event.detail,
                "key operation"
            );
        } else {
            tracing::warn!(
                target: "audit",
                key_id = ?event.key_id.as_ref().map(|k| k.as_str()),
                key_kind = ?event.key_kind,
                action = ?event.action,
                detail = ?event.detail,
                "key operation failed"
            );
        }
    }
}

/// Discards every event.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// Collects events in memory (for tests).
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Events whose action matches `action`.
    pub fn events_for(&self, action: &AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| &e.action == action)
            .cloned()
            .collect()
    }

    pub fn failures(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| !e.success).cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_filters() {
        let sink = InMemoryAuditSink::new();
        let id = KeyId::new("k1");
        sink.record(AuditEvent::key_event(&id, KeyKind::Symmetric, AuditAction::KeyGenerated));
        sink.record(AuditEvent::key_event(&id, KeyKind::Symmetric, AuditAction::Decrypt).with_failure());
        sink.record(AuditEvent::store_event(AuditAction::KeysCleared));

        assert_eq!(sink.count(), 3);
        assert_eq!(sink.events_for(&AuditAction::KeyGenerated).len(), 1);
        assert_eq!(sink.failures().len(), 1);
        assert!(sink.events()[2].key_id.is_none());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracing_sink_logs_success_at_info_under_audit_target() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingAuditSink.record(AuditEvent::key_event(
                &KeyId::new("k1"),
                KeyKind::Symmetric,
                AuditAction::KeyGenerated,
            ));
        });

        let out = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(out.contains("INFO"), "{}", out);
        assert!(out.contains("audit: key operation"), "{}", out);
        assert!(out.contains("KeyGenerated"), "{}", out);
    }

    #[test]
    fn events_serialize() {
        let event = AuditEvent::store_event(AuditAction::KeysExported { count: 2 }).with_detail("backup");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("KeysExported"));
        assert!(json.contains("backup"));
    }
}
